//! Contextual suggestions for the selected slide, gated by a selection epoch.

use serde::Serialize;
use shared::{domain::SlideId, protocol::SuggestionSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuggestionCache {
    pub slide_id: Option<SlideId>,
    pub copilot: Vec<String>,
    pub image: Vec<String>,
    pub research: Vec<String>,
    pub epoch: u64,
    pub loading: bool,
}

/// Identifies one fetch. Only the ticket matching the live epoch may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionTicket {
    pub epoch: u64,
    pub slide_id: SlideId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionOutcome {
    Applied,
    Failed,
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct SuggestionPipeline {
    epoch: u64,
    cache: SuggestionCache,
}

impl SuggestionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    /// Starts a new epoch for `slide_id`, clearing whatever was shown before.
    pub fn begin(&mut self, slide_id: SlideId) -> SuggestionTicket {
        self.epoch += 1;
        self.cache = SuggestionCache {
            slide_id: Some(slide_id),
            epoch: self.epoch,
            loading: true,
            ..SuggestionCache::default()
        };
        SuggestionTicket {
            epoch: self.epoch,
            slide_id,
        }
    }

    pub fn complete<E>(
        &mut self,
        ticket: SuggestionTicket,
        result: Result<SuggestionSet, E>,
    ) -> SuggestionOutcome {
        if ticket.epoch != self.epoch {
            return SuggestionOutcome::Stale;
        }
        self.cache.loading = false;
        match result {
            Ok(set) => {
                self.cache.copilot = set.copilot;
                self.cache.image = set.image;
                self.cache.research = set.research;
                SuggestionOutcome::Applied
            }
            Err(_) => SuggestionOutcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tag: &str) -> SuggestionSet {
        SuggestionSet {
            copilot: vec![format!("{tag} copilot")],
            image: vec![format!("{tag} image")],
            research: vec![format!("{tag} research")],
        }
    }

    #[test]
    fn begin_clears_lists_and_marks_loading() {
        let mut pipeline = SuggestionPipeline::new();
        let first = SlideId::new();
        let ticket = pipeline.begin(first);
        pipeline.complete::<()>(ticket, Ok(set("a")));
        assert_eq!(pipeline.cache().copilot, vec!["a copilot".to_string()]);

        let second = SlideId::new();
        let ticket = pipeline.begin(second);
        assert_eq!(ticket.epoch, 2);
        let cache = pipeline.cache();
        assert!(cache.loading);
        assert!(cache.copilot.is_empty() && cache.image.is_empty() && cache.research.is_empty());
        assert_eq!(cache.slide_id, Some(second));
    }

    #[test]
    fn stale_ticket_is_ignored_in_either_arrival_order() {
        let mut pipeline = SuggestionPipeline::new();
        let (a, b) = (SlideId::new(), SlideId::new());
        let old = pipeline.begin(a);
        let new = pipeline.begin(b);

        assert_eq!(pipeline.complete::<()>(new, Ok(set("b"))), SuggestionOutcome::Applied);
        assert_eq!(pipeline.complete::<()>(old, Ok(set("a"))), SuggestionOutcome::Stale);
        assert_eq!(pipeline.cache().copilot, vec!["b copilot".to_string()]);
        assert_eq!(pipeline.cache().slide_id, Some(b));
    }

    #[test]
    fn failure_stops_loading_and_leaves_lists_empty() {
        let mut pipeline = SuggestionPipeline::new();
        let ticket = pipeline.begin(SlideId::new());
        assert_eq!(
            pipeline.complete(ticket, Err("boom")),
            SuggestionOutcome::Failed
        );
        assert!(!pipeline.cache().loading);
        assert!(pipeline.cache().copilot.is_empty());
    }
}
