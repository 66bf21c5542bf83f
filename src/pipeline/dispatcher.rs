//! Dispatcher: one inbound message → one route → one action plan.
//!
//! Flow:
//! 1. Interviewer mail is routed by rule and parsed for a verdict (no LLM)
//! 2. An applicant answering a confirmation request is parsed by rule
//! 3. Everything else is classified by the model
//! 4. `(trigger, state)` picks a [`Route`]; the handler builds a plan
//! 5. Primary email is sent; only then is the plan committed
//!
//! The registry is owned here. Nothing is mutated until the primary send
//! succeeds, so a failed message can be retried later from a clean slate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::transport::EmailTransport;
use crate::channels::types::{EmailMessage, OutgoingEmail, SentEmail, extract_addresses};
use crate::error::{PipelineError, TransitionError};
use crate::llm::recruiter::RecruiterModel;
use crate::pipeline::candidate::{CandidateState, HistoryEntry, InterviewStage};
use crate::pipeline::handlers::{self, ActionPlan, HandlerContext};
use crate::pipeline::registry::CandidateRegistry;
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{ApplicantAnswer, Category, InterviewerVerdict};

/// What happened in the message, as far as the state machine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Application,
    Availability,
    /// Question or follow-up.
    Side(Category),
    ApplicantConfirms,
    ApplicantDeclines,
    Interviewer(InterviewerVerdict),
}

impl Trigger {
    /// Trigger for an applicant message the model classified.
    pub fn from_category(category: Category) -> Self {
        match category {
            Category::NewApplication => Self::Application,
            Category::SchedulingResponse => Self::Availability,
            Category::Question | Category::FollowUp => Self::Side(category),
            // Applicants cannot send feedback; see `RulesEngine::sanitize`.
            Category::InterviewerFeedback => Self::Side(Category::Question),
        }
    }
}

/// Which action handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Score the application: `new → screening | rejected`.
    Evaluate,
    /// `screening → scheduling`, or re-forward while scheduling.
    ForwardAvailability,
    /// Interviewer accepted a slot; ask the applicant to confirm.
    RequestConfirmation,
    /// `scheduling → interviewed`.
    ConfirmInterview,
    /// Applicant declined the slot: `scheduling → screening`.
    Reschedule,
    /// Interviewer declined every slot: `scheduling → screening`.
    AlternativeTimes,
    Hire,
    Reject,
    /// Answer without touching state.
    SideConversation(Category),
    /// Interviewer reply we can't act on.
    ClarifyWithInterviewer,
    /// Candidate already hired or rejected.
    Closed,
}

/// The dispatch table.
pub fn route(trigger: Trigger, state: CandidateState, stage: Option<InterviewStage>) -> Route {
    use CandidateState::*;
    use InterviewerVerdict as V;

    let awaiting_applicant = stage == Some(InterviewStage::AwaitingApplicant);

    match (trigger, state) {
        (Trigger::Interviewer(_), Hired | Rejected) => Route::ClarifyWithInterviewer,
        (_, Hired | Rejected) => Route::Closed,

        (Trigger::Application, New) => Route::Evaluate,
        (Trigger::Application, _) => Route::SideConversation(Category::FollowUp),

        (Trigger::Availability, Screening | Scheduling) => Route::ForwardAvailability,
        (Trigger::Availability, _) => Route::SideConversation(Category::Question),

        (Trigger::Side(category), _) => Route::SideConversation(category),

        (Trigger::ApplicantConfirms, Scheduling) if awaiting_applicant => Route::ConfirmInterview,
        (Trigger::ApplicantDeclines, Scheduling) if awaiting_applicant => Route::Reschedule,
        (Trigger::ApplicantConfirms | Trigger::ApplicantDeclines, _) => {
            Route::SideConversation(Category::Question)
        }

        (Trigger::Interviewer(V::Approve), Scheduling) if !awaiting_applicant => {
            Route::RequestConfirmation
        }
        (Trigger::Interviewer(V::Decline), Scheduling) => Route::AlternativeTimes,
        (Trigger::Interviewer(V::Hire), Screening | Scheduling | Interviewed) => Route::Hire,
        (Trigger::Interviewer(V::Reject), Screening | Scheduling | Interviewed) => Route::Reject,
        (Trigger::Interviewer(_), _) => Route::ClarifyWithInterviewer,
    }
}

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub category: Category,
    /// `None` when interviewer feedback couldn't be tied to a candidate.
    pub candidate: Option<String>,
    pub route: Option<Route>,
    /// Candidate state after the commit.
    pub state: Option<CandidateState>,
    pub emails_sent: usize,
}

impl DispatchOutcome {
    fn ignored(category: Category) -> Self {
        Self {
            category,
            candidate: None,
            route: None,
            state: None,
            emails_sent: 0,
        }
    }
}

/// Owns the registry and turns messages into committed actions.
pub struct Dispatcher {
    registry: CandidateRegistry,
    model: Arc<dyn RecruiterModel>,
    transport: Arc<dyn EmailTransport>,
    rules: RulesEngine,
    threshold: u8,
}

impl Dispatcher {
    pub fn new(
        model: Arc<dyn RecruiterModel>,
        transport: Arc<dyn EmailTransport>,
        interviewer: &str,
        threshold: u8,
    ) -> Self {
        Self {
            registry: CandidateRegistry::new(),
            model,
            transport,
            rules: RulesEngine::new(interviewer),
            threshold,
        }
    }

    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    /// Dispatch one message to completion.
    ///
    /// On `Err` the registry is exactly as it was before the call.
    pub async fn dispatch(
        &mut self,
        message: &EmailMessage,
    ) -> Result<DispatchOutcome, PipelineError> {
        info!(
            id = %message.id,
            sender = %message.sender,
            subject = %message.subject,
            "Dispatching message"
        );

        let (category, trigger, identity) = if self.rules.is_interviewer(&message.sender) {
            let Some(identity) = self.resolve_feedback_subject(message) else {
                warn!(
                    id = %message.id,
                    subject = %message.subject,
                    "Interviewer feedback matches no candidate, ignoring"
                );
                return Ok(DispatchOutcome::ignored(Category::InterviewerFeedback));
            };
            let verdict = self.rules.interviewer_verdict(&message.fresh_text());
            debug!(identity = %identity, ?verdict, "Interviewer verdict");
            (
                Category::InterviewerFeedback,
                Trigger::Interviewer(verdict),
                identity,
            )
        } else if let Some(trigger) = self.confirmation_answer(message) {
            (Category::SchedulingResponse, trigger, message.sender.clone())
        } else {
            let category = self.model.classify(message).await?;
            let category = self.rules.sanitize(message, category);
            (category, Trigger::from_category(category), message.sender.clone())
        };

        let candidate = self.registry.get(&identity);
        let state = candidate.map_or(CandidateState::New, |c| c.state);
        let stage = candidate.and_then(|c| c.interview);
        let route = route(trigger, state, stage);
        debug!(
            identity = %identity,
            category = category.label(),
            state = %state,
            ?route,
            "Routed"
        );

        let ctx = HandlerContext {
            model: self.model.as_ref(),
            rules: &self.rules,
            threshold: self.threshold,
        };
        let plan = handlers::plan(&ctx, route, &identity, candidate, message).await?;

        if let Some(target) = plan.transition
            && !state.can_transition_to(target)
        {
            return Err(TransitionError {
                identity,
                from: state,
                to: target,
            }
            .into());
        }

        let emails_sent = self.execute(message, &plan).await?;
        Ok(DispatchOutcome {
            category,
            state: self.registry.get(&identity).map(|c| c.state),
            candidate: Some(identity),
            route: Some(route),
            emails_sent,
        })
    }

    /// An applicant's yes/no while we wait for them to confirm a slot.
    fn confirmation_answer(&self, message: &EmailMessage) -> Option<Trigger> {
        let candidate = self.registry.get(&message.sender)?;
        if !candidate.awaiting_applicant() {
            return None;
        }
        match self.rules.applicant_answer(&message.fresh_text()) {
            ApplicantAnswer::Confirm => Some(Trigger::ApplicantConfirms),
            ApplicantAnswer::Decline => Some(Trigger::ApplicantDeclines),
            ApplicantAnswer::Unclear => None,
        }
    }

    /// Which candidate an interviewer message is about.
    ///
    /// Thread of a notification we sent, then a candidate address in the
    /// text, then the only candidate waiting on the interviewer.
    fn resolve_feedback_subject(&self, message: &EmailMessage) -> Option<String> {
        if let Some(thread) = message.thread_id.as_deref()
            && let Some(candidate) = self.registry.candidate_for_thread(thread)
        {
            return Some(candidate.identity.clone());
        }

        let text = format!("{}\n{}", message.subject, message.body);
        if let Some(identity) = extract_addresses(&text)
            .into_iter()
            .find(|a| !self.rules.is_interviewer(a) && self.registry.contains(a))
        {
            return Some(identity);
        }

        match self.registry.awaiting_interviewer().as_slice() {
            [only] => Some(only.identity.clone()),
            _ => None,
        }
    }

    /// Send the primary email, commit, then send the secondary.
    async fn execute(
        &mut self,
        message: &EmailMessage,
        plan: &ActionPlan,
    ) -> Result<usize, PipelineError> {
        let mut sent = 0;

        let primary = match &plan.primary {
            Some(email) => {
                let receipt = self.transport.send(email).await?;
                info!(to = %email.to, subject = %email.subject, "Email sent");
                sent += 1;
                Some((email, receipt))
            }
            None => None,
        };

        self.commit(message, plan)?;
        if let Some((email, receipt)) = primary {
            self.record_sent(&plan.identity, email, &receipt);
        }

        if let Some(email) = &plan.secondary {
            match self.transport.send(email).await {
                Ok(receipt) => {
                    info!(to = %email.to, subject = %email.subject, "Email sent");
                    sent += 1;
                    self.record_sent(&plan.identity, email, &receipt);
                }
                Err(e) => {
                    warn!(to = %email.to, error = %e, "Follow-up email failed, not retrying");
                }
            }
        }

        Ok(sent)
    }

    fn commit(&mut self, message: &EmailMessage, plan: &ActionPlan) -> Result<(), TransitionError> {
        let identity = plan.identity.as_str();

        if plan.record_inbound {
            self.registry.record_message(
                identity,
                HistoryEntry::inbound(
                    &message.sender,
                    &message.subject,
                    &message.fresh_text(),
                    message.received_at,
                ),
            );
        } else if let Some(thread) = message.thread_id.as_deref() {
            self.registry.link_interviewer_thread(thread, identity);
        }

        if let Some((score, notes)) = &plan.score {
            self.registry.set_score(identity, *score, notes);
        }

        if let Some(target) = plan.transition {
            self.registry.set_state(identity, target, plan.reason.clone())?;
            info!(identity, state = %target, "Candidate state changed");
        }

        if plan.interview.is_some() {
            self.registry.set_interview_stage(identity, plan.interview);
        }
        Ok(())
    }

    /// Outbound mail to the applicant joins their history; mail to the
    /// interviewer links the thread for later feedback.
    fn record_sent(&mut self, identity: &str, email: &OutgoingEmail, receipt: &SentEmail) {
        if email.to.eq_ignore_ascii_case(identity) {
            self.registry.record_message(
                identity,
                HistoryEntry::outbound(&email.to, &email.subject, &email.body),
            );
        } else if self.rules.is_interviewer(&email.to) {
            let thread = receipt.thread_id.as_deref().unwrap_or(&receipt.message_id);
            self.registry.link_interviewer_thread(thread, identity);
        }
    }
}
