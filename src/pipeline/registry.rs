//! In-memory candidate registry, keyed by applicant email address.
//!
//! Owned by the dispatcher; accessed only from the poll loop, so no locking.

use std::collections::HashMap;

use tracing::debug;

use crate::error::TransitionError;
use crate::pipeline::candidate::{Candidate, CandidateState, HistoryEntry, InterviewStage};

#[derive(Debug, Default)]
pub struct CandidateRegistry {
    candidates: HashMap<String, Candidate>,
    /// Thread ids of interviewer notifications → candidate identity.
    interviewer_threads: HashMap<String, String>,
}

fn key(identity: &str) -> String {
    identity.trim().to_lowercase()
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a candidate, creating it in `New` with empty history if absent.
    pub fn get_or_create(&mut self, identity: &str) -> &mut Candidate {
        let key = key(identity);
        self.candidates.entry(key).or_insert_with_key(|k| {
            debug!(identity = %k, "New candidate");
            Candidate::new(k.clone())
        })
    }

    pub fn get(&self, identity: &str) -> Option<&Candidate> {
        self.candidates.get(&key(identity))
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.candidates.contains_key(&key(identity))
    }

    /// Append a message to the candidate's history (creating the candidate if needed).
    pub fn record_message(&mut self, identity: &str, entry: HistoryEntry) {
        self.get_or_create(identity).record(entry);
    }

    /// Move a candidate to `state`, enforcing the transition table.
    pub fn set_state(
        &mut self,
        identity: &str,
        state: CandidateState,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        self.get_or_create(identity).transition_to(state, reason)
    }

    /// Set or clear the interview-confirmation sub-flow.
    ///
    /// Ignored unless the candidate is in `Scheduling`.
    pub fn set_interview_stage(&mut self, identity: &str, stage: Option<InterviewStage>) {
        if let Some(candidate) = self.candidates.get_mut(&key(identity))
            && candidate.state == CandidateState::Scheduling
        {
            candidate.interview = stage;
        }
    }

    pub fn set_score(&mut self, identity: &str, score: u8, notes: &str) {
        let candidate = self.get_or_create(identity);
        candidate.score = Some(score);
        candidate.notes = notes.to_string();
    }

    /// Remember that `thread_id` carries an interviewer conversation about `identity`.
    pub fn link_interviewer_thread(&mut self, thread_id: &str, identity: &str) {
        self.interviewer_threads
            .insert(thread_id.to_string(), key(identity));
    }

    pub fn candidate_for_thread(&self, thread_id: &str) -> Option<&Candidate> {
        self.interviewer_threads
            .get(thread_id)
            .and_then(|identity| self.candidates.get(identity))
    }

    /// Candidates waiting for the interviewer to pick a slot.
    pub fn awaiting_interviewer(&self) -> Vec<&Candidate> {
        self.candidates
            .values()
            .filter(|c| c.awaiting_interviewer())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn get_or_create_creates_once() {
        let mut registry = CandidateRegistry::new();
        assert!(registry.is_empty());

        let candidate = registry.get_or_create("A@X.com");
        assert_eq!(candidate.identity, "a@x.com");
        assert_eq!(candidate.state, CandidateState::New);
        assert!(candidate.history.is_empty());

        registry.get_or_create("a@x.com");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn record_message_appends_in_order() {
        let mut registry = CandidateRegistry::new();
        registry.record_message(
            "a@x.com",
            HistoryEntry::inbound("a@x.com", "s", "first", Utc::now()),
        );
        registry.record_message("a@x.com", HistoryEntry::outbound("a@x.com", "Re: s", "second"));
        let history = &registry.get("a@x.com").unwrap().history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].body, "first");
        assert_eq!(history[1].body, "second");
    }

    #[test]
    fn set_state_enforces_table() {
        let mut registry = CandidateRegistry::new();
        assert!(registry.set_state("a@x.com", CandidateState::Interviewed, None).is_err());
        assert_eq!(registry.get("a@x.com").unwrap().state, CandidateState::New);
        registry.set_state("a@x.com", CandidateState::Screening, None).unwrap();
        assert_eq!(registry.get("a@x.com").unwrap().state, CandidateState::Screening);
    }

    #[test]
    fn interview_stage_only_in_scheduling() {
        let mut registry = CandidateRegistry::new();
        registry.set_state("a@x.com", CandidateState::Screening, None).unwrap();
        registry.set_interview_stage("a@x.com", Some(InterviewStage::AwaitingInterviewer));
        assert!(registry.get("a@x.com").unwrap().interview.is_none());

        registry.set_state("a@x.com", CandidateState::Scheduling, None).unwrap();
        registry.set_interview_stage("a@x.com", Some(InterviewStage::AwaitingInterviewer));
        assert_eq!(registry.awaiting_interviewer().len(), 1);
    }

    #[test]
    fn interviewer_thread_lookup() {
        let mut registry = CandidateRegistry::new();
        registry.get_or_create("a@x.com");
        registry.link_interviewer_thread("thr-9", "A@x.com");
        assert_eq!(registry.candidate_for_thread("thr-9").unwrap().identity, "a@x.com");
        assert!(registry.candidate_for_thread("thr-0").is_none());
    }
}
