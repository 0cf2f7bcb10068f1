//! Notifications broadcast to whatever renders the session.

use shared::{
    domain::{DeckPatch, Slide, SlideId},
    error::PersistenceError,
    protocol::Capability,
};

use crate::{operations::OperationSlot, publish::PublishState, suggestions::SuggestionCache};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    SlideUpdated(Slide),
    /// The selected slide changed identity or content.
    ActiveSlideChanged(Slide),
    SlideAppended(Slide),
    SelectionChanged {
        slide_id: SlideId,
        epoch: u64,
    },
    DeckUpdated(DeckPatch),
    OperationUpdated {
        capability: Capability,
        slot: OperationSlot,
    },
    SuggestionsUpdated(SuggestionCache),
    PublishUpdated(PublishState),
    PersistenceFailed(PersistenceError),
}
