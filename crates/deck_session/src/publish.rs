//! Publish state machine: Idle → Validating → Saving → Finalizing → Succeeded | Failed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{Deck, DeckId, Publication},
    error::{PersistenceError, ValidationError, ValidationProblem},
};
use thiserror::Error;

pub const LABEL_VALIDATING: &str = "Validating deck…";
pub const LABEL_SAVING: &str = "Saving deck…";
pub const LABEL_FINALIZING: &str = "Finalizing…";
pub const LABEL_PUBLISHED: &str = "Published";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PublishError {
    #[error(transparent)]
    Validation(ValidationError),
    #[error(transparent)]
    Persistence(PersistenceError),
    #[error("publish already {phase}")]
    NotIdle { phase: &'static str },
}

impl PublishError {
    pub fn user_message(&self) -> String {
        match self {
            PublishError::Validation(err) => err.user_message().to_string(),
            PublishError::Persistence(err) => err.user_message().to_string(),
            PublishError::NotIdle { .. } => "A publish is already in progress.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "error", rename_all = "snake_case")]
pub enum PublishPhase {
    Idle,
    Validating,
    Saving,
    Finalizing,
    Succeeded,
    Failed(PublishError),
}

impl PublishPhase {
    pub fn name(&self) -> &'static str {
        match self {
            PublishPhase::Idle => "idle",
            PublishPhase::Validating => "validating",
            PublishPhase::Saving => "saving",
            PublishPhase::Finalizing => "finalizing",
            PublishPhase::Succeeded => "succeeded",
            PublishPhase::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishState {
    pub phase: PublishPhase,
    pub progress_label: String,
    pub idempotency_key: Option<String>,
}

impl Default for PublishState {
    fn default() -> Self {
        Self {
            phase: PublishPhase::Idle,
            progress_label: String::new(),
            idempotency_key: None,
        }
    }
}

/// What the session needs to carry out the durable part of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTicket {
    pub deck_id: DeckId,
    pub publication: Publication,
}

pub fn validate(deck: &Deck) -> Result<(), ValidationError> {
    let mut problems = Vec::new();
    if deck.title.trim().is_empty() {
        problems.push(ValidationProblem::EmptyTitle);
    }
    if deck.slides.is_empty() {
        problems.push(ValidationProblem::NoSlides);
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { problems })
    }
}

pub fn idempotency_key(deck_id: DeckId, now: DateTime<Utc>) -> String {
    format!("{deck_id}-{}", now.timestamp_millis())
}

#[derive(Debug, Clone, Default)]
pub struct PublishWorkflow {
    state: PublishState,
    /// Key of an attempt that failed after validation; reused by the next start.
    retry_key: Option<String>,
}

impl PublishWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workflow for a deck as loaded from storage. A deck that already carries
    /// a publication opens published and read-only.
    pub fn resume(deck: &Deck) -> Self {
        match &deck.publication {
            Some(publication) => Self {
                state: PublishState {
                    phase: PublishPhase::Succeeded,
                    progress_label: LABEL_PUBLISHED.to_string(),
                    idempotency_key: Some(publication.idempotency_key.clone()),
                },
                retry_key: None,
            },
            None => Self::new(),
        }
    }

    pub fn state(&self) -> &PublishState {
        &self.state
    }

    pub fn is_published(&self) -> bool {
        self.state.phase == PublishPhase::Succeeded
    }

    fn enter(&mut self, phase: PublishPhase, label: impl Into<String>) {
        self.state.phase = phase;
        self.state.progress_label = label.into();
    }

    pub fn start(&mut self, deck: &Deck, now: DateTime<Utc>) -> Result<PublishTicket, PublishError> {
        if self.state.phase != PublishPhase::Idle {
            return Err(PublishError::NotIdle {
                phase: self.state.phase.name(),
            });
        }

        self.enter(PublishPhase::Validating, LABEL_VALIDATING);
        if let Err(err) = validate(deck) {
            self.retry_key = None;
            self.state.idempotency_key = None;
            let err = PublishError::Validation(err);
            self.enter(PublishPhase::Failed(err.clone()), err.user_message());
            return Err(err);
        }

        let key = self
            .retry_key
            .take()
            .unwrap_or_else(|| idempotency_key(deck.id, now));
        self.state.idempotency_key = Some(key.clone());
        self.enter(PublishPhase::Saving, LABEL_SAVING);

        Ok(PublishTicket {
            deck_id: deck.id,
            publication: Publication {
                idempotency_key: key,
                published_at: now,
            },
        })
    }

    pub fn saved(&mut self) -> bool {
        if self.state.phase != PublishPhase::Saving {
            return false;
        }
        self.enter(PublishPhase::Finalizing, LABEL_FINALIZING);
        true
    }

    pub fn succeeded(&mut self) -> bool {
        if self.state.phase != PublishPhase::Finalizing {
            return false;
        }
        self.retry_key = None;
        self.enter(PublishPhase::Succeeded, LABEL_PUBLISHED);
        true
    }

    /// Durable failure during Saving or Finalizing.
    pub fn failed(&mut self, err: PersistenceError) -> bool {
        if !matches!(
            self.state.phase,
            PublishPhase::Saving | PublishPhase::Finalizing
        ) {
            return false;
        }
        self.retry_key = self.state.idempotency_key.clone();
        let err = PublishError::Persistence(err);
        let label = err.user_message();
        self.enter(PublishPhase::Failed(err), label);
        true
    }

    /// Returns a failed workflow to Idle.
    pub fn acknowledge(&mut self) -> bool {
        if !matches!(self.state.phase, PublishPhase::Failed(_)) {
            return false;
        }
        self.state = PublishState::default();
        true
    }
}

#[cfg(test)]
#[path = "tests/publish_tests.rs"]
mod tests;
