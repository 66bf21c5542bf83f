//! Candidate record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Position of an applicant in the hiring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    /// First message seen, not evaluated yet.
    New,
    /// Qualified; waiting for availability.
    Screening,
    /// Availability forwarded to the interviewer.
    Scheduling,
    /// Interview confirmed by both sides.
    Interviewed,
    Hired,
    Rejected,
}

impl CandidateState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: CandidateState) -> bool {
        use CandidateState::*;

        matches!(
            (self, target),
            // Evaluation
            (New, Screening) | (New, Rejected) |
            // Availability received
            (Screening, Scheduling) |
            // Interviewer said no, or applicant declined the slot
            (Scheduling, Screening) |
            // Applicant confirmed the slot
            (Scheduling, Interviewed) |
            // Final decisions
            (Screening, Hired) | (Screening, Rejected) |
            (Scheduling, Hired) | (Scheduling, Rejected) |
            (Interviewed, Hired) | (Interviewed, Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Hired | Self::Rejected)
    }
}

impl std::fmt::Display for CandidateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Screening => "screening",
            Self::Scheduling => "scheduling",
            Self::Interviewed => "interviewed",
            Self::Hired => "hired",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Interview-confirmation sub-flow, layered on `Scheduling`.
///
/// The primary state stays `Scheduling` until the applicant confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStage {
    AwaitingInterviewer,
    AwaitingApplicant,
}

/// Which way a history entry went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One message exchanged with the applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub direction: Direction,
    /// Sender for inbound, recipient for outbound.
    pub counterpart: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn inbound(from: &str, subject: &str, body: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            direction: Direction::Inbound,
            counterpart: from.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp,
        }
    }

    pub fn outbound(to: &str, subject: &str, body: &str) -> Self {
        Self {
            direction: Direction::Outbound,
            counterpart: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: CandidateState,
    pub to: CandidateState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One applicant, keyed by email address.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub identity: String,
    pub state: CandidateState,
    /// Latest evaluation score (1..=10).
    pub score: Option<u8>,
    /// Evaluation reasoning.
    pub notes: String,
    pub interview: Option<InterviewStage>,
    /// Append-only, insertion ordered.
    pub history: Vec<HistoryEntry>,
    pub transitions: Vec<StateTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(identity: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.into(),
            state: CandidateState::New,
            score: None,
            notes: String::new(),
            interview: None,
            history: Vec::new(),
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new state, enforcing the transition table.
    pub fn transition_to(
        &mut self,
        new_state: CandidateState,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(new_state) {
            return Err(TransitionError {
                identity: self.identity.clone(),
                from: self.state,
                to: new_state,
            });
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason,
        });
        self.state = new_state;
        self.updated_at = Utc::now();

        // The sub-flow only lives inside `Scheduling`.
        if new_state != CandidateState::Scheduling {
            self.interview = None;
        }
        Ok(())
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
        self.updated_at = Utc::now();
    }

    /// The most recent `n` history entries, oldest first.
    pub fn recent_history(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn awaiting_applicant(&self) -> bool {
        self.state == CandidateState::Scheduling
            && self.interview == Some(InterviewStage::AwaitingApplicant)
    }

    pub fn awaiting_interviewer(&self) -> bool {
        self.state == CandidateState::Scheduling
            && self.interview == Some(InterviewStage::AwaitingInterviewer)
    }
}
