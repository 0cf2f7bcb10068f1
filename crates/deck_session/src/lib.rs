//! Editing-session core for a slide deck: optimistic slide edits, assistant
//! capabilities tracked per capability, epoch-gated suggestions and the
//! publish workflow, all behind one [`SessionController`] per open deck.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex as SlotLock, MutexGuard, PoisonError},
};

use assistant::AssistantGateway;
use chrono::Utc;
use serde::Serialize;
use shared::{
    domain::{Deck, DeckId, DeckPatch, Slide, SlideId, SlidePatch},
    error::PersistenceError,
    protocol::{Capability, SlideContext},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

mod capabilities;
pub mod error;
pub mod events;
pub mod mutation;
pub mod operations;
pub mod persistence;
pub mod publish;
pub mod store;
pub mod suggestions;

pub use capabilities::ResearchTopic;
pub use error::SessionError;
pub use events::SessionEvent;
pub use mutation::{MutationCoordinator, PendingWrite};
pub use operations::{CapabilityError, OperationSlot, OperationTracker};
pub use persistence::{MissingPersistence, PersistenceGateway};
pub use publish::{PublishError, PublishPhase, PublishState, PublishWorkflow};
pub use store::{Direction, SlideStore};
pub use suggestions::{SuggestionCache, SuggestionOutcome, SuggestionPipeline, SuggestionTicket};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Read-only view handed to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub deck: Deck,
    pub selected_slide: Option<Slide>,
    pub operations: BTreeMap<Capability, OperationSlot>,
    pub suggestions: SuggestionCache,
    pub publish: PublishState,
    pub read_only: bool,
}

struct SessionState {
    store: SlideStore,
    suggestions: SuggestionPipeline,
    publish: PublishWorkflow,
}

/// One open deck. All mutable state sits behind a single lock that is only
/// held for bookkeeping, never across a gateway call. Operation slots have
/// their own synchronous lock so an abandoned call can release its slot
/// from `Drop`; it is always taken after `inner`.
pub struct SessionController {
    assistant: Arc<dyn AssistantGateway>,
    persistence: Arc<dyn PersistenceGateway>,
    coordinator: MutationCoordinator,
    inner: Mutex<SessionState>,
    operations: SlotLock<OperationTracker>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub async fn open(
        deck_id: DeckId,
        persistence: Arc<dyn PersistenceGateway>,
        assistant: Arc<dyn AssistantGateway>,
    ) -> Result<Arc<Self>, SessionError> {
        let deck = persistence
            .read_deck(deck_id)
            .await
            .map_err(|err| SessionError::Load {
                deck_id,
                message: format!("{err:#}"),
            })?
            .ok_or(SessionError::DeckNotFound(deck_id))?;
        info!(
            %deck_id,
            slides = deck.slides.len(),
            published = deck.publication.is_some(),
            "session: deck opened"
        );
        Ok(Self::from_deck(deck, persistence, assistant))
    }

    /// Builds a session around an already loaded deck and starts fetching
    /// suggestions for its first slide. Must run inside a tokio runtime.
    pub fn from_deck(
        deck: Deck,
        persistence: Arc<dyn PersistenceGateway>,
        assistant: Arc<dyn AssistantGateway>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut state = SessionState {
            publish: PublishWorkflow::resume(&deck),
            store: SlideStore::new(deck),
            suggestions: SuggestionPipeline::new(),
        };
        let initial = state
            .store
            .selected()
            .map(SlideContext::from)
            .map(|context| (state.suggestions.begin(context.slide_id), context));

        let session = Arc::new(Self {
            assistant,
            coordinator: MutationCoordinator::new(Arc::clone(&persistence), events.clone()),
            persistence,
            inner: Mutex::new(state),
            operations: SlotLock::new(OperationTracker::new()),
            events,
        });
        if let Some((ticket, context)) = initial {
            // The first fetch is detached; later selections hand back their handle.
            drop(session.spawn_suggestion_fetch(ticket, context));
        }
        session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn operations(&self) -> MutexGuard<'_, OperationTracker> {
        // Slot updates cannot leave the tracker half-written, so a poisoned
        // lock is still usable.
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guard = self.inner.lock().await;
        SessionSnapshot {
            deck: guard.store.deck().clone(),
            selected_slide: guard.store.selected().cloned(),
            operations: self.operations().slots().clone(),
            suggestions: guard.suggestions.cache().clone(),
            publish: guard.publish.state().clone(),
            read_only: guard.publish.is_published(),
        }
    }

    /// Selects `slide_id` and fetches its suggestions in the background.
    /// Returns `None` without fetching when the slide is already selected.
    pub async fn select_slide(
        self: &Arc<Self>,
        slide_id: SlideId,
    ) -> Result<Option<JoinHandle<()>>, SessionError> {
        let (ticket, context) = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            if !state.store.select(slide_id)? {
                return Ok(None);
            }
            let ticket = state.suggestions.begin(slide_id);
            let slide = state
                .store
                .selected()
                .cloned()
                .ok_or(SessionError::UnknownSlide(slide_id))?;
            self.emit(SessionEvent::SelectionChanged {
                slide_id,
                epoch: ticket.epoch,
            });
            self.emit(SessionEvent::SuggestionsUpdated(
                state.suggestions.cache().clone(),
            ));
            let context = SlideContext::from(&slide);
            self.emit(SessionEvent::ActiveSlideChanged(slide));
            (ticket, context)
        };
        debug!(%slide_id, epoch = ticket.epoch, "session: slide selected");
        Ok(Some(self.spawn_suggestion_fetch(ticket, context)))
    }

    pub async fn navigate_prev(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>, SessionError> {
        self.navigate(Direction::Previous).await
    }

    pub async fn navigate_next(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>, SessionError> {
        self.navigate(Direction::Next).await
    }

    async fn navigate(
        self: &Arc<Self>,
        direction: Direction,
    ) -> Result<Option<JoinHandle<()>>, SessionError> {
        let target = self.inner.lock().await.store.neighbour(direction);
        match target {
            Some(slide_id) => self.select_slide(slide_id).await,
            None => Ok(None),
        }
    }

    fn spawn_suggestion_fetch(
        self: &Arc<Self>,
        ticket: SuggestionTicket,
        context: SlideContext,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.refresh_suggestions(ticket, context).await;
        })
    }

    async fn refresh_suggestions(&self, ticket: SuggestionTicket, context: SlideContext) {
        let result = self.assistant.fetch_all_suggestions(&context).await;
        if let Err(err) = &result {
            warn!(
                slide_id = %ticket.slide_id,
                epoch = ticket.epoch,
                error = %format!("{err:#}"),
                "suggestions: fetch failed"
            );
        }

        let mut guard = self.inner.lock().await;
        match guard.suggestions.complete(ticket, result) {
            SuggestionOutcome::Stale => {
                debug!(
                    slide_id = %ticket.slide_id,
                    epoch = ticket.epoch,
                    current_epoch = guard.suggestions.epoch(),
                    "suggestions: discarding stale result"
                );
            }
            SuggestionOutcome::Applied | SuggestionOutcome::Failed => {
                self.emit(SessionEvent::SuggestionsUpdated(
                    guard.suggestions.cache().clone(),
                ));
            }
        }
    }

    pub async fn set_title(&self, title: impl Into<String>) -> Result<PendingWrite, SessionError> {
        self.update_deck(DeckPatch::title(title)).await
    }

    pub async fn set_template(
        &self,
        template: impl Into<String>,
    ) -> Result<PendingWrite, SessionError> {
        self.update_deck(DeckPatch::template(template)).await
    }

    async fn update_deck(&self, patch: DeckPatch) -> Result<PendingWrite, SessionError> {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        if state.publish.is_published() {
            return Err(SessionError::ReadOnly);
        }
        Ok(self.coordinator.apply_deck_patch(&mut state.store, patch))
    }

    /// Direct edit of one slide, e.g. typing into its title or body.
    pub async fn update_slide(
        &self,
        slide_id: SlideId,
        patch: SlidePatch,
    ) -> Result<PendingWrite, SessionError> {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        if state.publish.is_published() {
            return Err(SessionError::ReadOnly);
        }
        self.coordinator
            .apply_patch(&mut state.store, slide_id, patch)
    }

    /// Runs the publish workflow to completion. Validation failures are
    /// returned immediately and nothing is written.
    pub async fn publish(&self) -> Result<(), PublishError> {
        let ticket = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let started = state.publish.start(state.store.deck(), Utc::now());
            if !matches!(started, Err(PublishError::NotIdle { .. })) {
                self.emit(SessionEvent::PublishUpdated(state.publish.state().clone()));
            }
            started?
        };
        let key = ticket.publication.idempotency_key.clone();
        info!(deck_id = %ticket.deck_id, idempotency_key = %key, "publish: saving");

        let patch = DeckPatch {
            publication: Some(ticket.publication.clone()),
            ..DeckPatch::default()
        };
        if let Err(err) = self
            .persistence
            .write_deck_fields(ticket.deck_id, &patch)
            .await
        {
            return Err(self
                .fail_publish(PersistenceError::new("deck publication", format!("{err:#}")))
                .await);
        }

        {
            let mut guard = self.inner.lock().await;
            guard.publish.saved();
            self.emit(SessionEvent::PublishUpdated(guard.publish.state().clone()));
        }

        let confirmed = match self.persistence.read_deck(ticket.deck_id).await {
            Ok(Some(deck)) => deck
                .publication
                .is_some_and(|publication| publication.idempotency_key == key),
            Ok(None) => false,
            Err(err) => {
                return Err(self
                    .fail_publish(PersistenceError::new(
                        "deck publication",
                        format!("{err:#}"),
                    ))
                    .await);
            }
        };
        if !confirmed {
            return Err(self
                .fail_publish(PersistenceError::new(
                    "deck publication",
                    "publication was not recorded",
                ))
                .await);
        }

        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        state.store.set_deck_field(&patch);
        state.publish.succeeded();
        self.emit(SessionEvent::PublishUpdated(state.publish.state().clone()));
        info!(deck_id = %ticket.deck_id, "publish: deck published");
        Ok(())
    }

    async fn fail_publish(&self, err: PersistenceError) -> PublishError {
        warn!(error = %err, "publish: durable step failed");
        let mut guard = self.inner.lock().await;
        guard.publish.failed(err.clone());
        self.emit(SessionEvent::PublishUpdated(guard.publish.state().clone()));
        PublishError::Persistence(err)
    }

    /// Waits for every background write started so far, e.g. before exit.
    pub async fn flush(&self) {
        self.coordinator.flush().await;
    }

    /// Returns a failed publish to Idle. No-op in any other phase.
    pub async fn acknowledge_publish(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let reset = guard.publish.acknowledge();
        if reset {
            self.emit(SessionEvent::PublishUpdated(guard.publish.state().clone()));
        }
        reset
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
