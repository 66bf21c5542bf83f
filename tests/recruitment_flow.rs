//! End-to-end recruiting flow through the poll loop.
//!
//! Uses the in-memory transport and a stub LLM that answers by prompt type,
//! so the real prompt building and response parsing are exercised.

use std::sync::Arc;

use async_trait::async_trait;

use mailhub::channels::{EmailTransport, MemoryTransport};
use mailhub::error::LlmError;
use mailhub::llm::{CompletionRequest, CompletionResponse, LlmProvider, LlmRecruiter};
use mailhub::pipeline::{CandidateState, Dispatcher, InterviewStage, PollLoop, PollSettings};

const INTERVIEWER: &str = "interviewer@company.com";

/// Answers each prompt type with a canned response.
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub-llm"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let system = request.system_prompt().unwrap_or_default();
        let user = request
            .messages
            .last()
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();

        let content = if system.contains("Categorize") {
            if user.contains("available") {
                "scheduling_response"
            } else if user.contains("apply") {
                "new_application"
            } else {
                "question"
            }
        } else if system.contains("Evaluate") {
            if user.contains("junior") {
                r#"{"score": 3, "strengths": ["enthusiasm"],
                    "missing_skills": ["production ML"], "reasoning": "Too early"}"#
            } else {
                r#"```json
{"score": 9, "qualified": true, "strengths": ["Rust", "PyTorch"],
 "missing_skills": [], "reasoning": "Strong ML background"}
```"#
            }
        } else if user.contains("extract the available times") {
            "- Tuesday 2pm\n- Thursday 10am"
        } else {
            "Thanks for your email! We'll be in touch."
        };

        Ok(CompletionResponse {
            content: content.to_string(),
            input_tokens: 100,
            output_tokens: 20,
        })
    }
}

async fn setup() -> (PollLoop, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let inbox = transport.create_inbox("mailhub").await.unwrap();
    let recruiter = Arc::new(LlmRecruiter::new(Arc::new(StubLlm)));
    let dispatcher = Dispatcher::new(recruiter, transport.clone(), INTERVIEWER, 6);
    let poller = PollLoop::new(dispatcher, transport.clone(), inbox, PollSettings::default());
    (poller, transport)
}

#[tokio::test]
async fn qualified_applicant_reaches_interview() {
    let (mut poller, transport) = setup().await;

    // 1. Application scoring 9/10
    transport.deliver(
        "Ada <a@x.com>",
        "Application: ML Engineer",
        "Hi, I'd like to apply for the ML Engineer role. Five years of Rust and PyTorch.",
    );
    let stats = poller.poll_once().await.unwrap();
    assert_eq!(stats.processed, 1);

    let candidate = poller.registry().get("a@x.com").unwrap();
    assert_eq!(candidate.state, CandidateState::Screening);
    assert_eq!(candidate.score, Some(9));
    assert_eq!(transport.sent_to("a@x.com").len(), 1);
    let notifications = transport.sent_to(INTERVIEWER);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].subject, "New Qualified Candidate: a@x.com");

    // 2. Availability
    transport.deliver(
        "a@x.com",
        "Re: Application: ML Engineer",
        "I'm available Tuesday at 2pm or Thursday at 10am.",
    );
    poller.poll_once().await.unwrap();

    let candidate = poller.registry().get("a@x.com").unwrap();
    assert_eq!(candidate.state, CandidateState::Scheduling);
    assert_eq!(candidate.interview, Some(InterviewStage::AwaitingInterviewer));
    let forward = transport.sent_to(INTERVIEWER).pop().unwrap();
    assert_eq!(forward.subject, "Interview Availability: a@x.com");
    assert!(forward.body.contains("- Tuesday 2pm"));

    // 3. Interviewer says yes, replying in the forwarded thread
    let thread = transport.last_receipt_to(INTERVIEWER).unwrap().thread_id;
    let before = transport.sent_to("a@x.com").len();
    transport.deliver_in_thread(
        INTERVIEWER,
        "Re: Interview Availability",
        "Yes, Tuesday 2pm works for me.",
        thread.as_deref(),
    );
    poller.poll_once().await.unwrap();

    let candidate = poller.registry().get("a@x.com").unwrap();
    assert_eq!(candidate.state, CandidateState::Scheduling);
    assert_eq!(candidate.interview, Some(InterviewStage::AwaitingApplicant));
    let to_applicant = transport.sent_to("a@x.com");
    assert_eq!(to_applicant.len(), before + 1);
    assert_eq!(
        to_applicant.last().unwrap().subject,
        "Please confirm your interview time"
    );

    // 4. Applicant confirms
    let interviewer_before = transport.sent_to(INTERVIEWER).len();
    transport.deliver("a@x.com", "Re: Please confirm your interview time", "Yes, I'll be there!");
    poller.poll_once().await.unwrap();

    let candidate = poller.registry().get("a@x.com").unwrap();
    assert_eq!(candidate.state, CandidateState::Interviewed);
    assert!(candidate.interview.is_none());
    let to_interviewer = transport.sent_to(INTERVIEWER);
    assert_eq!(to_interviewer.len(), interviewer_before + 1);
    assert_eq!(
        to_interviewer.last().unwrap().subject,
        "Interview Confirmed: a@x.com"
    );

    // Only the applicant's messages and our replies to them are in history.
    assert!(
        candidate
            .history
            .iter()
            .all(|e| e.counterpart.eq_ignore_ascii_case("a@x.com"))
    );
    assert_eq!(poller.registry().len(), 1);
}

#[tokio::test]
async fn unqualified_applicant_is_rejected_and_questions_keep_state() {
    let (mut poller, transport) = setup().await;

    transport.deliver(
        "b@x.com",
        "Application",
        "I'm a junior developer and would love to apply.",
    );
    poller.poll_once().await.unwrap();

    let candidate = poller.registry().get("b@x.com").unwrap();
    assert_eq!(candidate.state, CandidateState::Rejected);
    assert_eq!(transport.sent_to("b@x.com").len(), 1);
    assert!(transport.sent_to(INTERVIEWER).is_empty());

    transport.deliver("b@x.com", "Re: Application", "Could you tell me why?");
    poller.poll_once().await.unwrap();

    assert_eq!(
        poller.registry().get("b@x.com").unwrap().state,
        CandidateState::Rejected
    );
    assert_eq!(transport.sent_to("b@x.com").len(), 2);
}

#[tokio::test]
async fn interviewer_no_sends_applicant_back_to_screening() {
    let (mut poller, transport) = setup().await;

    transport.deliver("c@x.com", "Application", "I want to apply. Ten years of ML.");
    poller.poll_once().await.unwrap();
    transport.deliver("c@x.com", "Re: Application", "I'm available Monday morning.");
    poller.poll_once().await.unwrap();

    // No thread id: resolved by the address in the subject.
    transport.deliver(
        INTERVIEWER,
        "Re: Interview Availability: c@x.com",
        "No, none of those times work.",
    );
    poller.poll_once().await.unwrap();

    let candidate = poller.registry().get("c@x.com").unwrap();
    assert_eq!(candidate.state, CandidateState::Screening);
    assert!(candidate.interview.is_none());
    assert!(
        !transport
            .sent_to("c@x.com")
            .iter()
            .any(|e| e.subject == "Please confirm your interview time")
    );
}
