//! Per-field correction lifecycle.
//!
//! ```text
//! Pending -> Proposing -> ProposalFailed
//!                      -> Proposed -> Embedding -> EmbedFailed
//!                                              -> Embedded -> Assigning -> Assigned
//!                                                          -> WritingBack -> Done
//! ```
//!
//! Transitions only move forward. A rerun starts from a fresh `Pending`.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldState {
    Pending,
    Proposing,
    ProposalFailed,
    Proposed,
    Embedding,
    EmbedFailed,
    Embedded,
    Assigning,
    Assigned,
    WritingBack,
    Done,
}

impl FieldState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FieldState::ProposalFailed | FieldState::EmbedFailed | FieldState::Done
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FieldState::ProposalFailed | FieldState::EmbedFailed)
    }

    fn can_advance_to(&self, next: FieldState) -> bool {
        use FieldState::*;
        matches!(
            (self, next),
            (Pending, Proposing)
                | (Proposing, ProposalFailed)
                | (Proposing, Proposed)
                | (Proposed, Embedding)
                | (Embedding, EmbedFailed)
                | (Embedding, Embedded)
                | (Embedded, Assigning)
                | (Assigning, Assigned)
                | (Assigned, WritingBack)
                | (WritingBack, Done)
        )
    }
}

impl std::fmt::Display for FieldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldState::Pending => "PENDING",
            FieldState::Proposing => "PROPOSING",
            FieldState::ProposalFailed => "PROPOSAL_FAILED",
            FieldState::Proposed => "PROPOSED",
            FieldState::Embedding => "EMBEDDING",
            FieldState::EmbedFailed => "EMBED_FAILED",
            FieldState::Embedded => "EMBEDDED",
            FieldState::Assigning => "ASSIGNING",
            FieldState::Assigned => "ASSIGNED",
            FieldState::WritingBack => "WRITING_BACK",
            FieldState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Forward-only state tracker for one field within one run
#[derive(Debug, Clone)]
pub struct FieldLifecycle {
    field: String,
    state: FieldState,
}

impl FieldLifecycle {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            state: FieldState::Pending,
        }
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    pub fn advance(&mut self, next: FieldState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(field = %self.field, from = %self.state, to = %next, "field state");
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut lc = FieldLifecycle::new("occupation");
        for next in [
            FieldState::Proposing,
            FieldState::Proposed,
            FieldState::Embedding,
            FieldState::Embedded,
            FieldState::Assigning,
            FieldState::Assigned,
            FieldState::WritingBack,
            FieldState::Done,
        ] {
            lc.advance(next).unwrap();
        }
        assert!(lc.state().is_terminal());
        assert!(!lc.state().is_failure());
    }

    #[test]
    fn test_failure_states_are_terminal() {
        let mut lc = FieldLifecycle::new("gender");
        lc.advance(FieldState::Proposing).unwrap();
        lc.advance(FieldState::ProposalFailed).unwrap();
        assert!(lc.state().is_failure());
        assert!(lc.advance(FieldState::Proposed).is_err());
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        let mut lc = FieldLifecycle::new("topic");
        assert!(matches!(
            lc.advance(FieldState::Embedding),
            Err(Error::InvalidTransition { from: FieldState::Pending, to: FieldState::Embedding })
        ));
        lc.advance(FieldState::Proposing).unwrap();
        lc.advance(FieldState::Proposed).unwrap();
        assert!(lc.advance(FieldState::Proposing).is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        let json = serde_json::to_string(&FieldState::WritingBack).unwrap();
        assert_eq!(json, "\"WRITING_BACK\"");
        assert_eq!(FieldState::WritingBack.to_string(), "WRITING_BACK");
    }
}
