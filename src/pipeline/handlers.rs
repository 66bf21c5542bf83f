//! Action handlers: one per route out of the dispatch table.
//!
//! A handler never touches the registry or the transport. It calls the model
//! and returns an [`ActionPlan`]; the dispatcher sends the primary email and
//! only then commits the plan.

use tracing::{debug, info};

use crate::channels::types::{EmailMessage, OutgoingEmail, excerpt};
use crate::error::ClassificationError;
use crate::llm::recruiter::RecruiterModel;
use crate::pipeline::candidate::{
    Candidate, CandidateState, Direction, HistoryEntry, InterviewStage,
};
use crate::pipeline::dispatcher::Route;
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{Category, ReplyIntent};

/// History entries handed to the model as context.
pub const HISTORY_CONTEXT: usize = 10;

/// Characters of the application quoted to the interviewer.
const APPLICATION_EXCERPT: usize = 500;

/// What to do for one inbound message, computed before anything is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    /// Candidate the message is about.
    pub identity: String,
    /// Append the inbound message to the candidate's history (applicant mail only).
    pub record_inbound: bool,
    /// Score and notes to store.
    pub score: Option<(u8, String)>,
    pub transition: Option<CandidateState>,
    pub reason: Option<String>,
    /// Sub-flow stage to set after the transition.
    pub interview: Option<InterviewStage>,
    /// Must succeed before anything is committed.
    pub primary: Option<OutgoingEmail>,
    /// Sent after the commit; failure is only logged.
    pub secondary: Option<OutgoingEmail>,
}

impl ActionPlan {
    fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            ..Self::default()
        }
    }
}

/// Collaborators shared by all handlers.
pub struct HandlerContext<'a> {
    pub model: &'a dyn RecruiterModel,
    pub rules: &'a RulesEngine,
    pub threshold: u8,
}

impl HandlerContext<'_> {
    fn interviewer(&self) -> &str {
        self.rules.interviewer()
    }
}

/// Build the plan for `route`.
///
/// `candidate` is `None` only for an applicant we have never seen.
pub async fn plan(
    ctx: &HandlerContext<'_>,
    route: Route,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let from_interviewer = ctx.rules.is_interviewer(&message.sender);
    let mut plan = match route {
        Route::Evaluate => evaluate_application(ctx, identity, candidate, message).await?,
        Route::ForwardAvailability => {
            forward_availability(ctx, identity, candidate, message).await?
        }
        Route::RequestConfirmation => {
            request_confirmation(ctx, identity, candidate, message).await?
        }
        Route::ConfirmInterview => confirm_interview(ctx, identity, candidate, message).await?,
        Route::Reschedule => reschedule(ctx, identity, candidate, message).await?,
        Route::AlternativeTimes => alternative_times(ctx, identity, candidate, message).await?,
        Route::Hire => final_decision(ctx, identity, candidate, message, true).await?,
        Route::Reject => final_decision(ctx, identity, candidate, message, false).await?,
        Route::SideConversation(category) => {
            side_conversation(ctx, identity, candidate, message, category).await?
        }
        Route::ClarifyWithInterviewer => {
            clarify_with_interviewer(ctx, identity, candidate, message)
        }
        Route::Closed => closed(ctx, identity, candidate, message).await?,
    };
    plan.record_inbound = !from_interviewer;
    Ok(plan)
}

fn history(candidate: Option<&Candidate>) -> &[HistoryEntry] {
    match candidate {
        Some(c) => c.recent_history(HISTORY_CONTEXT),
        None => &[],
    }
}

/// Write an applicant reply to `message` in its thread.
async fn reply(
    ctx: &HandlerContext<'_>,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
    intent: &ReplyIntent,
) -> Result<OutgoingEmail, ClassificationError> {
    let body = ctx
        .model
        .generate_reply(history(candidate), message, intent)
        .await?;
    Ok(OutgoingEmail::reply_to(message, body))
}

/// Write to the applicant when the trigger came from the interviewer.
///
/// The reply is composed against the applicant's latest message so the model
/// answers the right person.
async fn write_to_applicant(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    trigger: &EmailMessage,
    subject: &str,
    intent: &ReplyIntent,
) -> Result<OutgoingEmail, ClassificationError> {
    let anchor = candidate
        .and_then(|c| {
            c.history
                .iter()
                .rev()
                .find(|e| e.direction == Direction::Inbound)
        })
        .map(|entry| EmailMessage {
            id: trigger.id.clone(),
            thread_id: None,
            sender: identity.to_string(),
            recipients: Vec::new(),
            subject: entry.subject.clone(),
            body: entry.body.clone(),
            received_at: entry.timestamp,
        })
        .unwrap_or_else(|| trigger.clone());

    let body = ctx
        .model
        .generate_reply(history(candidate), &anchor, intent)
        .await?;
    Ok(OutgoingEmail::new(identity, subject, body))
}

fn notify_interviewer(ctx: &HandlerContext<'_>, subject: String, body: String) -> OutgoingEmail {
    OutgoingEmail::new(ctx.interviewer(), subject, body)
}

fn acknowledge_interviewer(message: &EmailMessage, body: String) -> OutgoingEmail {
    OutgoingEmail::reply_to(message, body)
}

// ── Applicant-triggered routes ──────────────────────────────────────

async fn evaluate_application(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let evaluation = ctx.model.score(message).await?;
    let qualified = evaluation.is_qualified(ctx.threshold);
    info!(
        identity,
        score = evaluation.score,
        threshold = ctx.threshold,
        qualified,
        "Application evaluated"
    );

    let mut plan = ActionPlan::new(identity);
    plan.score = Some((evaluation.score, evaluation.reasoning.clone()));
    plan.reason = Some(format!("scored {}/10", evaluation.score));

    if qualified {
        plan.transition = Some(CandidateState::Screening);
        plan.secondary = Some(notify_interviewer(
            ctx,
            format!("New Qualified Candidate: {identity}"),
            format!(
                "New candidate scored {}/10:\n\nFrom: {identity}\nStrengths: {}\n\n\
                 Application:\n{}\n\nThey will be scheduling a screening call soon.",
                evaluation.score,
                evaluation.strengths.join(", "),
                excerpt(&message.fresh_text(), APPLICATION_EXCERPT),
            ),
        ));
        plan.primary = Some(
            reply(ctx, candidate, message, &ReplyIntent::ScreeningInvite { evaluation }).await?,
        );
    } else {
        plan.transition = Some(CandidateState::Rejected);
        plan.primary = Some(
            reply(
                ctx,
                candidate,
                message,
                &ReplyIntent::EncouragingRejection { evaluation },
            )
            .await?,
        );
    }
    Ok(plan)
}

async fn forward_availability(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let availability = ctx.model.extract_availability(message).await?;

    let mut plan = ActionPlan::new(identity);
    if candidate.is_some_and(|c| c.state == CandidateState::Screening) {
        plan.transition = Some(CandidateState::Scheduling);
        plan.reason = Some("availability received".to_string());
    } else {
        debug!(identity, "Availability re-sent while scheduling");
    }
    plan.interview = Some(InterviewStage::AwaitingInterviewer);
    plan.primary = Some(reply(ctx, candidate, message, &ReplyIntent::AvailabilityReceived).await?);
    plan.secondary = Some(notify_interviewer(
        ctx,
        format!("Interview Availability: {identity}"),
        format!(
            "Candidate has provided availability:\n\n{availability}\n\n\
             Original message:\n{}\n\nPlease reply with your preferred time.",
            message.fresh_text()
        ),
    ));
    Ok(plan)
}

async fn confirm_interview(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let mut plan = ActionPlan::new(identity);
    plan.transition = Some(CandidateState::Interviewed);
    plan.reason = Some("applicant confirmed interview".to_string());
    plan.primary = Some(reply(ctx, candidate, message, &ReplyIntent::InterviewConfirmed).await?);
    plan.secondary = Some(notify_interviewer(
        ctx,
        format!("Interview Confirmed: {identity}"),
        format!(
            "{identity} confirmed the interview.\n\nTheir reply:\n{}",
            message.fresh_text()
        ),
    ));
    Ok(plan)
}

async fn reschedule(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let mut plan = ActionPlan::new(identity);
    plan.transition = Some(CandidateState::Screening);
    plan.reason = Some("applicant declined proposed time".to_string());
    plan.primary = Some(reply(ctx, candidate, message, &ReplyIntent::RescheduleRequest).await?);
    plan.secondary = Some(notify_interviewer(
        ctx,
        format!("Interview Declined: {identity}"),
        format!(
            "{identity} can't make the proposed time and has been asked for new availability.\n\n\
             Their reply:\n{}",
            message.fresh_text()
        ),
    ));
    Ok(plan)
}

async fn side_conversation(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
    category: Category,
) -> Result<ActionPlan, ClassificationError> {
    let mut plan = ActionPlan::new(identity);
    plan.primary = Some(
        reply(
            ctx,
            candidate,
            message,
            &ReplyIntent::SideConversation { category },
        )
        .await?,
    );
    Ok(plan)
}

async fn closed(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let mut plan = ActionPlan::new(identity);
    plan.primary = Some(reply(ctx, candidate, message, &ReplyIntent::General).await?);
    Ok(plan)
}

// ── Interviewer-triggered routes ────────────────────────────────────

async fn request_confirmation(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let intent = ReplyIntent::ConfirmationRequest {
        interviewer_note: message.fresh_text(),
    };
    let mut plan = ActionPlan::new(identity);
    plan.interview = Some(InterviewStage::AwaitingApplicant);
    plan.primary = Some(
        write_to_applicant(
            ctx,
            identity,
            candidate,
            message,
            "Please confirm your interview time",
            &intent,
        )
        .await?,
    );
    plan.secondary = Some(acknowledge_interviewer(
        message,
        format!("Thanks! I've asked {identity} to confirm the interview time."),
    ));
    Ok(plan)
}

async fn alternative_times(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> Result<ActionPlan, ClassificationError> {
    let mut plan = ActionPlan::new(identity);
    plan.transition = Some(CandidateState::Screening);
    plan.reason = Some("no proposed time works for the interviewer".to_string());
    plan.primary = Some(
        write_to_applicant(
            ctx,
            identity,
            candidate,
            message,
            "New interview times needed",
            &ReplyIntent::AlternativeTimesRequest,
        )
        .await?,
    );
    plan.secondary = Some(acknowledge_interviewer(
        message,
        format!(
            "Understood. I've asked {identity} for other times and will forward them \
             when they reply."
        ),
    ));
    Ok(plan)
}

async fn final_decision(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
    hire: bool,
) -> Result<ActionPlan, ClassificationError> {
    let (state, intent, subject, ack) = if hire {
        (
            CandidateState::Hired,
            ReplyIntent::OfferExtended,
            "Good news about your application",
            format!("Great, I've let {identity} know an offer is on its way."),
        )
    } else {
        (
            CandidateState::Rejected,
            ReplyIntent::ProcessClosed,
            "An update on your application",
            format!("Understood. I've let {identity} know we won't be moving forward."),
        )
    };

    let mut plan = ActionPlan::new(identity);
    plan.transition = Some(state);
    plan.reason = Some("interviewer decision".to_string());
    plan.primary =
        Some(write_to_applicant(ctx, identity, candidate, message, subject, &intent).await?);
    plan.secondary = Some(acknowledge_interviewer(message, ack));
    Ok(plan)
}

/// The interviewer's reply didn't map to anything legal for this candidate.
fn clarify_with_interviewer(
    ctx: &HandlerContext<'_>,
    identity: &str,
    candidate: Option<&Candidate>,
    message: &EmailMessage,
) -> ActionPlan {
    let state = candidate.map_or(CandidateState::New, |c| c.state);
    debug!(
        identity,
        state = %state,
        interviewer = ctx.interviewer(),
        "Asking interviewer to clarify"
    );

    let mut plan = ActionPlan::new(identity);
    plan.primary = Some(acknowledge_interviewer(
        message,
        format!(
            "Thanks for your reply. I couldn't tell what you'd like to do with {identity} \
             (currently {state}).\n\nPlease reply with \"yes\" to accept one of the proposed \
             times, \"no\" if none of them work, or \"hire\" / \"reject\" for a final decision."
        ),
    ));
    plan
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::error::LlmError;
    use crate::pipeline::types::Evaluation;

    /// Records every reply intent; answers with fixed text.
    struct StubModel {
        score: u8,
        intents: Mutex<Vec<ReplyIntent>>,
        anchors: Mutex<Vec<String>>,
    }

    impl StubModel {
        fn new(score: u8) -> Self {
            Self {
                score,
                intents: Mutex::new(Vec::new()),
                anchors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecruiterModel for StubModel {
        async fn classify(&self, _: &EmailMessage) -> Result<Category, ClassificationError> {
            Ok(Category::Question)
        }

        async fn score(&self, _: &EmailMessage) -> Result<Evaluation, ClassificationError> {
            Ok(Evaluation {
                score: self.score,
                strengths: vec!["Rust".into()],
                missing_skills: vec!["Kubernetes".into()],
                reasoning: "solid systems background".into(),
            })
        }

        async fn generate_reply(
            &self,
            _: &[HistoryEntry],
            message: &EmailMessage,
            intent: &ReplyIntent,
        ) -> Result<String, ClassificationError> {
            self.intents.lock().unwrap().push(intent.clone());
            self.anchors.lock().unwrap().push(message.sender.clone());
            Ok("reply body".into())
        }

        async fn extract_availability(
            &self,
            _: &EmailMessage,
        ) -> Result<String, ClassificationError> {
            Ok("- Tuesday 2pm".into())
        }

        async fn probe(&self) -> Result<(), ClassificationError> {
            Err(LlmError::RequestFailed {
                provider: "stub".into(),
                reason: "unauthorized".into(),
            }
            .into())
        }
    }

    fn message(sender: &str, body: &str) -> EmailMessage {
        EmailMessage {
            id: "m-1".into(),
            thread_id: Some("thr-1".into()),
            sender: sender.into(),
            recipients: vec![],
            subject: "Application".into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    fn ctx<'a>(model: &'a StubModel, rules: &'a RulesEngine) -> HandlerContext<'a> {
        HandlerContext {
            model,
            rules,
            threshold: 6,
        }
    }

    #[tokio::test]
    async fn qualified_application_invites_and_notifies() {
        let model = StubModel::new(9);
        let rules = RulesEngine::new("boss@company.com");
        let msg = message("a@x.com", "I'd like to apply.");
        let plan = plan(&ctx(&model, &rules), Route::Evaluate, "a@x.com", None, &msg)
            .await
            .unwrap();

        assert_eq!(plan.transition, Some(CandidateState::Screening));
        assert_eq!(plan.score, Some((9, "solid systems background".into())));
        assert!(plan.record_inbound);
        let primary = plan.primary.unwrap();
        assert_eq!(primary.to, "a@x.com");
        assert_eq!(primary.in_reply_to.as_deref(), Some("m-1"));
        let secondary = plan.secondary.unwrap();
        assert_eq!(secondary.to, "boss@company.com");
        assert_eq!(secondary.subject, "New Qualified Candidate: a@x.com");
        assert!(secondary.body.contains("9/10"));
        assert!(matches!(
            model.intents.lock().unwrap()[0],
            ReplyIntent::ScreeningInvite { .. }
        ));
    }

    #[tokio::test]
    async fn unqualified_application_gets_one_reply() {
        let model = StubModel::new(3);
        let rules = RulesEngine::new("boss@company.com");
        let msg = message("a@x.com", "hire me");
        let plan = plan(&ctx(&model, &rules), Route::Evaluate, "a@x.com", None, &msg)
            .await
            .unwrap();
        assert_eq!(plan.transition, Some(CandidateState::Rejected));
        assert!(plan.primary.is_some());
        assert!(plan.secondary.is_none());
    }

    #[tokio::test]
    async fn availability_from_screening_moves_to_scheduling() {
        let model = StubModel::new(9);
        let rules = RulesEngine::new("boss@company.com");
        let mut candidate = Candidate::new("a@x.com");
        candidate.transition_to(CandidateState::Screening, None).unwrap();

        let msg = message("a@x.com", "Tuesday at 2pm works");
        let plan = plan(
            &ctx(&model, &rules),
            Route::ForwardAvailability,
            "a@x.com",
            Some(&candidate),
            &msg,
        )
        .await
        .unwrap();
        assert_eq!(plan.transition, Some(CandidateState::Scheduling));
        assert_eq!(plan.interview, Some(InterviewStage::AwaitingInterviewer));
        let forward = plan.secondary.unwrap();
        assert_eq!(forward.subject, "Interview Availability: a@x.com");
        assert!(forward.body.contains("- Tuesday 2pm"));
    }

    #[tokio::test]
    async fn confirmation_request_is_written_to_applicant() {
        let model = StubModel::new(9);
        let rules = RulesEngine::new("boss@company.com");
        let mut candidate = Candidate::new("a@x.com");
        candidate.record(HistoryEntry::inbound("a@x.com", "Times", "Tue 2pm", Utc::now()));

        let msg = message("boss@company.com", "yes, Tuesday works");
        let plan = plan(
            &ctx(&model, &rules),
            Route::RequestConfirmation,
            "a@x.com",
            Some(&candidate),
            &msg,
        )
        .await
        .unwrap();

        assert!(!plan.record_inbound);
        assert_eq!(plan.transition, None);
        assert_eq!(plan.interview, Some(InterviewStage::AwaitingApplicant));
        let primary = plan.primary.unwrap();
        assert_eq!(primary.to, "a@x.com");
        assert!(primary.in_reply_to.is_none());
        assert_eq!(plan.secondary.unwrap().to, "boss@company.com");
        // Composed against the applicant's message, not the interviewer's.
        assert_eq!(model.anchors.lock().unwrap()[0], "a@x.com");
    }

    #[tokio::test]
    async fn clarify_sends_nothing_to_applicant() {
        let model = StubModel::new(9);
        let rules = RulesEngine::new("boss@company.com");
        let candidate = Candidate::new("a@x.com");
        let msg = message("boss@company.com", "hmm");
        let plan = plan(
            &ctx(&model, &rules),
            Route::ClarifyWithInterviewer,
            "a@x.com",
            Some(&candidate),
            &msg,
        )
        .await
        .unwrap();
        assert_eq!(plan.primary.unwrap().to, "boss@company.com");
        assert!(plan.secondary.is_none());
        assert!(plan.transition.is_none());
        assert!(model.intents.lock().unwrap().is_empty());
    }
}
