//! In-memory authoritative copy of the deck plus the current selection.

use shared::domain::{Deck, DeckPatch, Slide, SlideId, SlidePatch};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

#[derive(Debug, Clone)]
pub struct SlideStore {
    deck: Deck,
    selected: Option<SlideId>,
}

impl SlideStore {
    /// Selects the first slide, if there is one.
    pub fn new(deck: Deck) -> Self {
        let selected = deck.slides.first().map(|slide| slide.id);
        Self { deck, selected }
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn selected_id(&self) -> Option<SlideId> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Slide> {
        self.selected.and_then(|slide_id| self.deck.slide(slide_id))
    }

    pub fn slide(&self, slide_id: SlideId) -> Option<&Slide> {
        self.deck.slide(slide_id)
    }

    /// Returns `false` when `slide_id` was already selected.
    pub fn select(&mut self, slide_id: SlideId) -> Result<bool, SessionError> {
        if self.deck.slide(slide_id).is_none() {
            return Err(SessionError::UnknownSlide(slide_id));
        }
        if self.selected == Some(slide_id) {
            return Ok(false);
        }
        self.selected = Some(slide_id);
        Ok(true)
    }

    pub fn patch_slide(
        &mut self,
        slide_id: SlideId,
        patch: &SlidePatch,
    ) -> Result<&Slide, SessionError> {
        let slide = self
            .deck
            .slide_mut(slide_id)
            .ok_or(SessionError::UnknownSlide(slide_id))?;
        slide.apply(patch);
        Ok(slide)
    }

    /// Adds `slide` at the end of the deck. Selection is left to the caller.
    pub fn append_slide(&mut self, slide: Slide) -> Result<&Slide, SessionError> {
        if self.deck.slide(slide.id).is_some() {
            return Err(SessionError::DuplicateSlide(slide.id));
        }
        let index = self.deck.slides.len();
        self.deck.slides.push(slide);
        Ok(&self.deck.slides[index])
    }

    pub fn set_deck_field(&mut self, patch: &DeckPatch) {
        self.deck.apply(patch);
    }

    pub fn neighbour(&self, direction: Direction) -> Option<SlideId> {
        let index = self.deck.position(self.selected?)?;
        let target = match direction {
            Direction::Previous => index.checked_sub(1)?,
            Direction::Next => index + 1,
        };
        self.deck.slides.get(target).map(|slide| slide.id)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
