//! Shared types for the recruiting pipeline.

use serde::{Deserialize, Serialize};

// ── Category ────────────────────────────────────────────────────────

/// Classification label for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Someone applying for a job.
    NewApplication,
    /// Applicant providing availability.
    SchedulingResponse,
    /// Interviewer answering about a candidate.
    InterviewerFeedback,
    /// Applicant asking something.
    Question,
    /// Applicant chasing their application.
    FollowUp,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::NewApplication,
        Category::SchedulingResponse,
        Category::InterviewerFeedback,
        Category::Question,
        Category::FollowUp,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::NewApplication => "new_application",
            Self::SchedulingResponse => "scheduling_response",
            Self::InterviewerFeedback => "interviewer_feedback",
            Self::Question => "question",
            Self::FollowUp => "follow_up",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    /// Side conversations never move the candidate.
    pub fn is_side_conversation(&self) -> bool {
        matches!(self, Self::Question | Self::FollowUp)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Model evaluation of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 1..=10.
    pub score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Evaluation {
    pub fn is_qualified(&self, threshold: u8) -> bool {
        self.score >= threshold
    }
}

// ── Decisions parsed from replies ───────────────────────────────────

/// What the interviewer said about a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewerVerdict {
    /// A proposed time works; ask the applicant to confirm.
    Approve,
    /// No proposed time works; back to screening.
    Decline,
    /// Make an offer.
    Hire,
    /// Stop the process.
    Reject,
    Unclear,
}

/// Applicant's answer to an interview confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantAnswer {
    Confirm,
    Decline,
    Unclear,
}

// ── Reply intents ───────────────────────────────────────────────────

/// What an outbound reply should accomplish. Wording is left to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyIntent {
    /// Qualified applicant: invite to a screening call, ask for availability.
    ScreeningInvite { evaluation: Evaluation },
    /// Unqualified applicant: encouraging rejection.
    EncouragingRejection { evaluation: Evaluation },
    /// Thank for availability, promise confirmation within 24 hours.
    AvailabilityReceived,
    /// Interviewer approved a slot; ask the applicant to confirm it.
    ConfirmationRequest { interviewer_note: String },
    /// Applicant confirmed; interview is locked in.
    InterviewConfirmed,
    /// Applicant declined the slot; ask for new availability.
    RescheduleRequest,
    /// No slot worked for the interviewer; ask for other times.
    AlternativeTimesRequest,
    /// Offer extended.
    OfferExtended,
    /// Process stopped after screening or scheduling.
    ProcessClosed,
    /// Question or follow-up: answer helpfully, no promises about status.
    SideConversation { category: Category },
    /// Reply carries no pipeline change (e.g. already-closed candidate).
    General,
}

impl ReplyIntent {
    /// Instructions appended to the reply prompt.
    pub fn instructions(&self) -> String {
        match self {
            Self::ScreeningInvite { evaluation } => format!(
                "This candidate scored {}/10.\nStrengths: {}\n\
                 Be enthusiastic and invite them to schedule a screening call. \
                 Ask for their availability in the next week.",
                evaluation.score,
                join_or_none(&evaluation.strengths),
            ),
            Self::EncouragingRejection { evaluation } => format!(
                "This candidate isn't a fit right now.\nMissing: {}\n\
                 Be encouraging and suggest they apply again in the future \
                 after gaining more experience.",
                join_or_none(&evaluation.missing_skills),
            ),
            Self::AvailabilityReceived => "Thank them for the availability and let them know \
                 we'll confirm a time within 24 hours."
                .to_string(),
            Self::ConfirmationRequest { interviewer_note } => format!(
                "The interviewer has accepted one of the proposed times. Interviewer note:\n{}\n\
                 Ask the candidate to reply confirming they can attend.",
                interviewer_note
            ),
            Self::InterviewConfirmed => "The candidate confirmed the interview. Thank them, \
                 confirm it is scheduled and say the interviewer will be in touch."
                .to_string(),
            Self::RescheduleRequest => "The candidate cannot make the proposed time. \
                 Acknowledge it kindly and ask for a few alternative time slots."
                .to_string(),
            Self::AlternativeTimesRequest => "None of the proposed times work for the interviewer. \
                 Apologise and ask the candidate for a few other time slots."
                .to_string(),
            Self::OfferExtended => "The team would like to make an offer. Congratulate the \
                 candidate and say a formal offer will follow."
                .to_string(),
            Self::ProcessClosed => "The team decided not to move forward. Thank the candidate \
                 warmly for their time and encourage them to apply again."
                .to_string(),
            Self::SideConversation { category } => format!(
                "This is a {} from the candidate. Answer helpfully and keep next steps clear. \
                 Do not promise any hiring decision.",
                category.label().replace('_', " ")
            ),
            Self::General => "Write a response email that's helpful and professional.".to_string(),
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none listed".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_roundtrip() {
        for category in Category::ALL {
            assert_eq!(Category::from_label(category.label()), Some(category));
        }
        assert_eq!(Category::from_label("other"), None);
    }

    #[test]
    fn category_serde_uses_labels() {
        let json = serde_json::to_string(&Category::FollowUp).unwrap();
        assert_eq!(json, "\"follow_up\"");
    }

    #[test]
    fn side_conversation_categories() {
        assert!(Category::Question.is_side_conversation());
        assert!(Category::FollowUp.is_side_conversation());
        assert!(!Category::NewApplication.is_side_conversation());
        assert!(!Category::InterviewerFeedback.is_side_conversation());
    }

    #[test]
    fn threshold_is_inclusive() {
        let eval = Evaluation {
            score: 6,
            strengths: vec![],
            missing_skills: vec![],
            reasoning: String::new(),
        };
        assert!(eval.is_qualified(6));
        assert!(!eval.is_qualified(7));
    }

    #[test]
    fn screening_invite_mentions_score_and_strengths() {
        let intent = ReplyIntent::ScreeningInvite {
            evaluation: Evaluation {
                score: 9,
                strengths: vec!["Rust".into(), "distributed systems".into()],
                missing_skills: vec![],
                reasoning: "strong".into(),
            },
        };
        let text = intent.instructions();
        assert!(text.contains("9/10"));
        assert!(text.contains("Rust, distributed systems"));
    }

    #[test]
    fn rejection_lists_missing_skills_or_none() {
        let intent = ReplyIntent::EncouragingRejection {
            evaluation: Evaluation {
                score: 2,
                strengths: vec![],
                missing_skills: vec![],
                reasoning: String::new(),
            },
        };
        assert!(intent.instructions().contains("none listed"));
    }
}
