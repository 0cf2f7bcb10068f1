use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{Deck, DeckId, DeckPatch, Slide, SlideId, SlidePatch};
use storage::Storage;

/// Durable home of decks. Writes are partial: only the fields present in a
/// patch are touched.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn read_deck(&self, deck_id: DeckId) -> Result<Option<Deck>>;
    async fn write_deck_fields(&self, deck_id: DeckId, patch: &DeckPatch) -> Result<()>;
    async fn write_slide_fields(&self, slide_id: SlideId, patch: &SlidePatch) -> Result<()>;
    async fn insert_slide(&self, deck_id: DeckId, slide: &Slide) -> Result<()>;
}

pub struct MissingPersistence;

#[async_trait]
impl PersistenceGateway for MissingPersistence {
    async fn read_deck(&self, deck_id: DeckId) -> Result<Option<Deck>> {
        Err(anyhow!("deck store unavailable; cannot read deck {deck_id}"))
    }

    async fn write_deck_fields(&self, deck_id: DeckId, _patch: &DeckPatch) -> Result<()> {
        Err(anyhow!("deck store unavailable; cannot write deck {deck_id}"))
    }

    async fn write_slide_fields(&self, slide_id: SlideId, _patch: &SlidePatch) -> Result<()> {
        Err(anyhow!("deck store unavailable; cannot write slide {slide_id}"))
    }

    async fn insert_slide(&self, deck_id: DeckId, slide: &Slide) -> Result<()> {
        Err(anyhow!(
            "deck store unavailable; cannot insert slide {} into deck {deck_id}",
            slide.id
        ))
    }
}

#[async_trait]
impl PersistenceGateway for Storage {
    async fn read_deck(&self, deck_id: DeckId) -> Result<Option<Deck>> {
        Storage::read_deck(self, deck_id).await
    }

    async fn write_deck_fields(&self, deck_id: DeckId, patch: &DeckPatch) -> Result<()> {
        Storage::write_deck_fields(self, deck_id, patch).await
    }

    async fn write_slide_fields(&self, slide_id: SlideId, patch: &SlidePatch) -> Result<()> {
        Storage::write_slide_fields(self, slide_id, patch).await
    }

    async fn insert_slide(&self, deck_id: DeckId, slide: &Slide) -> Result<()> {
        Storage::insert_slide(self, deck_id, slide).await
    }
}
