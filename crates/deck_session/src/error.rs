use shared::domain::{DeckId, SlideId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("deck {0} not found")]
    DeckNotFound(DeckId),
    #[error("failed to load deck {deck_id}: {message}")]
    Load { deck_id: DeckId, message: String },
    #[error("slide {0} is not part of this deck")]
    UnknownSlide(SlideId),
    #[error("slide {0} already exists in this deck")]
    DuplicateSlide(SlideId),
    #[error("the deck has been published and is read-only")]
    ReadOnly,
}
