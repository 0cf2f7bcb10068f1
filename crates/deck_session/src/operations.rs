//! Per-capability async state: one slot per capability for the whole session.

use std::collections::BTreeMap;

use assistant::AssistantError;
use serde::Serialize;
use shared::{
    domain::SlideId,
    error::ProviderErrorKind,
    protocol::{Capability, CapabilityResult},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    #[error("select a slide first")]
    NoSelection,
    #[error("the deck has been published and is read-only")]
    ReadOnly,
    #[error("this slide has no image to edit")]
    MissingImage,
    #[error("slide {0} is no longer part of the deck")]
    SlideMissing(SlideId),
    #[error("slide {0} already exists in this deck")]
    DuplicateSlide(SlideId),
    #[error("{}", .0.user_message())]
    Provider(ProviderErrorKind),
}

impl CapabilityError {
    pub fn from_provider(err: anyhow::Error) -> Self {
        CapabilityError::Provider(classify_provider_error(&err))
    }

    /// Short text suitable for showing next to the control that failed.
    pub fn user_message(&self) -> String {
        match self {
            CapabilityError::NoSelection => "Select a slide first.".to_string(),
            CapabilityError::ReadOnly => {
                "This deck has been published and can no longer be edited.".to_string()
            }
            CapabilityError::MissingImage => "Add an image to this slide first.".to_string(),
            CapabilityError::SlideMissing(_) => {
                "The slide this request was for no longer exists.".to_string()
            }
            CapabilityError::DuplicateSlide(_) => {
                "That slide has already been added to the deck.".to_string()
            }
            CapabilityError::Provider(kind) => kind.user_message().to_string(),
        }
    }
}

/// Maps an assistant failure onto the closed provider error set. Typed
/// `AssistantError`s are trusted first, free text is the fallback.
pub fn classify_provider_error(err: &anyhow::Error) -> ProviderErrorKind {
    match err.downcast_ref::<AssistantError>() {
        Some(AssistantError::Rejected {
            status,
            code,
            message,
        }) => code
            .as_deref()
            .and_then(ProviderErrorKind::from_code)
            .unwrap_or_else(|| match ProviderErrorKind::from_status(*status) {
                ProviderErrorKind::Unknown => ProviderErrorKind::from_message(message),
                kind => kind,
            }),
        Some(AssistantError::Timeout) => ProviderErrorKind::Timeout,
        Some(AssistantError::Malformed(_)) => ProviderErrorKind::FormatError,
        Some(AssistantError::Transport(message)) => ProviderErrorKind::from_message(message),
        None => ProviderErrorKind::from_message(&format!("{err:#}")),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationSlot {
    pub pending: bool,
    pub error: Option<String>,
    pub result: Option<CapabilityResult>,
    /// Calls of this capability that have started and not yet finished.
    pub in_flight: u32,
}

#[derive(Debug, Clone)]
pub struct OperationTracker {
    slots: BTreeMap<Capability, OperationSlot>,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            slots: Capability::ALL
                .into_iter()
                .map(|capability| (capability, OperationSlot::default()))
                .collect(),
        }
    }

    pub fn slot(&self, capability: Capability) -> &OperationSlot {
        // Every capability gets a slot in `new`.
        &self.slots[&capability]
    }

    pub fn slots(&self) -> &BTreeMap<Capability, OperationSlot> {
        &self.slots
    }

    fn slot_mut(&mut self, capability: Capability) -> &mut OperationSlot {
        self.slots.entry(capability).or_default()
    }

    pub fn begin(&mut self, capability: Capability) -> &OperationSlot {
        let slot = self.slot_mut(capability);
        slot.in_flight += 1;
        slot.pending = true;
        slot.error = None;
        slot
    }

    pub fn succeed(&mut self, result: CapabilityResult) -> &OperationSlot {
        let slot = self.slot_mut(result.capability());
        slot.in_flight = slot.in_flight.saturating_sub(1);
        slot.pending = slot.in_flight > 0;
        slot.result = Some(result);
        slot
    }

    pub fn fail(&mut self, capability: Capability, err: &CapabilityError) -> &OperationSlot {
        let slot = self.slot_mut(capability);
        slot.in_flight = slot.in_flight.saturating_sub(1);
        slot.pending = slot.in_flight > 0;
        slot.error = Some(err.user_message());
        slot
    }

    /// Releases a call whose caller stopped waiting for it. The last result
    /// and error are kept.
    pub fn abandon(&mut self, capability: Capability) -> &OperationSlot {
        let slot = self.slot_mut(capability);
        slot.in_flight = slot.in_flight.saturating_sub(1);
        slot.pending = slot.in_flight > 0;
        slot
    }

    /// Records a failure for a call that was refused before it started.
    pub fn reject(&mut self, capability: Capability, err: &CapabilityError) -> &OperationSlot {
        let slot = self.slot_mut(capability);
        slot.error = Some(err.user_message());
        slot
    }
}

#[cfg(test)]
#[path = "tests/operations_tests.rs"]
mod tests;
