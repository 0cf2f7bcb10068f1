use std::{future::Future, sync::Arc};

use shared::{
    domain::{DeckPatch, Slide, SlideId, SlidePatch},
    error::PersistenceError,
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    error::SessionError, events::SessionEvent, persistence::PersistenceGateway, store::SlideStore,
};

/// Background durable write started by an optimistic mutation.
#[must_use = "dropping a PendingWrite detaches it; the write still runs"]
pub struct PendingWrite(JoinHandle<()>);

impl PendingWrite {
    /// Waits for the durable write to finish, successfully or not.
    pub async fn settled(self) {
        if let Err(err) = self.0.await {
            warn!(error = %err, "persistence: background write task aborted");
        }
    }

    pub fn detach(self) {}
}

/// Counts one background write towards `flush` until dropped, which also
/// covers writes that panic or are aborted.
struct Outstanding(Arc<watch::Sender<usize>>);

impl Outstanding {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|count| *count += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Applies patches to the store immediately and forwards them to the
/// persistence gateway in the background. Failed writes are reported, never
/// rolled back or retried.
pub struct MutationCoordinator {
    persistence: Arc<dyn PersistenceGateway>,
    events: broadcast::Sender<SessionEvent>,
    outstanding: Arc<watch::Sender<usize>>,
}

impl MutationCoordinator {
    pub fn new(
        persistence: Arc<dyn PersistenceGateway>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            persistence,
            events,
            outstanding: Arc::new(outstanding),
        }
    }

    fn spawn_write<F>(&self, write: F) -> PendingWrite
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let outstanding = Outstanding::enter(&self.outstanding);
        PendingWrite(tokio::spawn(async move {
            let _outstanding = outstanding;
            write.await;
        }))
    }

    /// Waits until every background write started so far has finished.
    pub async fn flush(&self) {
        let mut outstanding = self.outstanding.subscribe();
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }

    pub fn apply_patch(
        &self,
        store: &mut SlideStore,
        slide_id: SlideId,
        patch: SlidePatch,
    ) -> Result<PendingWrite, SessionError> {
        let slide = store.patch_slide(slide_id, &patch)?.clone();
        if store.selected_id() == Some(slide_id) {
            let _ = self
                .events
                .send(SessionEvent::ActiveSlideChanged(slide.clone()));
        }
        let _ = self.events.send(SessionEvent::SlideUpdated(slide));

        let persistence = Arc::clone(&self.persistence);
        let events = self.events.clone();
        Ok(self.spawn_write(async move {
            match persistence.write_slide_fields(slide_id, &patch).await {
                Ok(()) => debug!(%slide_id, "persistence: slide fields written"),
                Err(err) => report_failure(&events, format!("slide {slide_id}"), err),
            }
        }))
    }

    pub fn apply_deck_patch(&self, store: &mut SlideStore, patch: DeckPatch) -> PendingWrite {
        store.set_deck_field(&patch);
        let deck_id = store.deck().id;
        let _ = self.events.send(SessionEvent::DeckUpdated(patch.clone()));

        let persistence = Arc::clone(&self.persistence);
        let events = self.events.clone();
        self.spawn_write(async move {
            match persistence.write_deck_fields(deck_id, &patch).await {
                Ok(()) => debug!(%deck_id, "persistence: deck fields written"),
                Err(err) => report_failure(&events, format!("deck {deck_id}"), err),
            }
        })
    }

    pub fn append_slide(
        &self,
        store: &mut SlideStore,
        slide: Slide,
    ) -> Result<PendingWrite, SessionError> {
        let slide = store.append_slide(slide)?.clone();
        let deck_id = store.deck().id;
        let _ = self.events.send(SessionEvent::SlideAppended(slide.clone()));

        let persistence = Arc::clone(&self.persistence);
        let events = self.events.clone();
        Ok(self.spawn_write(async move {
            match persistence.insert_slide(deck_id, &slide).await {
                Ok(()) => debug!(%deck_id, slide_id = %slide.id, "persistence: slide inserted"),
                Err(err) => report_failure(&events, format!("slide {}", slide.id), err),
            }
        }))
    }
}

fn report_failure(
    events: &broadcast::Sender<SessionEvent>,
    target: String,
    err: anyhow::Error,
) {
    warn!(
        write_target = %target,
        error = %format!("{err:#}"),
        "persistence: write failed; keeping optimistic state"
    );
    let _ = events.send(SessionEvent::PersistenceFailed(PersistenceError::new(
        target,
        format!("{err:#}"),
    )));
}
