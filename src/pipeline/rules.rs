//! Pre-LLM rules: sender routing and yes/no parsing.
//!
//! - Messages from the interviewer are always `interviewer_feedback` and
//!   never go through LLM classification.
//! - Only the interviewer may produce `interviewer_feedback`.
//! - Interviewer verdicts and applicant confirmations are read with regexes.

use regex::Regex;
use tracing::debug;

use crate::channels::types::EmailMessage;
use crate::pipeline::types::{ApplicantAnswer, Category, InterviewerVerdict};

/// Rules engine for routing and reply interpretation.
pub struct RulesEngine {
    interviewer: String,
    hire: Regex,
    reject: Regex,
    idiom: Regex,
    negative: Regex,
    positive: Regex,
}

/// Yes/no signal found in a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Yes,
    No,
    /// Both signals present, e.g. "yes, but Wednesday doesn't work".
    Mixed,
    None,
}

impl RulesEngine {
    pub fn new(interviewer: &str) -> Self {
        Self {
            interviewer: interviewer.trim().to_lowercase(),
            hire: Regex::new(concat!(
                r"(?i)\b(hire (him|her|them)|let'?s hire|we should hire",
                r"|(make|extend|send) (an|the) offer)\b",
            ))
            .unwrap(),
            reject: Regex::new(concat!(
                r"(?i)\b(reject|not a (good )?fit|pass on (him|her|them|this candidate)",
                r"|not moving forward|do not proceed|don'?t proceed)\b",
            ))
            .unwrap(),
            // "no problem" and friends are agreement, not refusal.
            idiom: Regex::new(r"(?i)\b(no (problem|worries|issue|issues)|not a problem)\b")
                .unwrap(),
            negative: Regex::new(concat!(
                r"(?i)(^\W*(no|nope|unfortunately)\b",
                r"|\b(doesn'?t work|does not work|don'?t work",
                r"|none of (these|those|the) (times|slots)",
                r"|not available|unavailable|can'?t make|cannot make|won'?t be able",
                r"|need to reschedule|have to reschedule)\b)",
            ))
            .unwrap(),
            positive: Regex::new(concat!(
                r"(?i)(^\W*(yes|yep|yeah|sure|ok|okay|confirmed|absolutely|definitely)\b",
                r"|\b(works (for me|great|well|fine|perfectly)|that works|sounds good|i confirm",
                r"|i can do|i'?ll be there|i will be there|see you then|book it|schedule it)\b)",
            ))
            .unwrap(),
        }
    }

    pub fn is_interviewer(&self, sender: &str) -> bool {
        sender.trim().eq_ignore_ascii_case(&self.interviewer)
    }

    pub fn interviewer(&self) -> &str {
        &self.interviewer
    }

    /// Guard a model label: only the interviewer may send feedback.
    pub fn sanitize(&self, message: &EmailMessage, category: Category) -> Category {
        if category == Category::InterviewerFeedback && !self.is_interviewer(&message.sender) {
            debug!(
                id = %message.id,
                sender = %message.sender,
                "Feedback label from non-interviewer, treating as question"
            );
            return Category::Question;
        }
        category
    }

    /// Read the interviewer's decision from a reply.
    pub fn interviewer_verdict(&self, text: &str) -> InterviewerVerdict {
        if self.hire.is_match(text) {
            return InterviewerVerdict::Hire;
        }
        if self.reject.is_match(text) {
            return InterviewerVerdict::Reject;
        }
        match self.polarity(text) {
            Polarity::Yes => InterviewerVerdict::Approve,
            Polarity::No => InterviewerVerdict::Decline,
            Polarity::Mixed | Polarity::None => InterviewerVerdict::Unclear,
        }
    }

    /// Read the applicant's answer to a confirmation request.
    pub fn applicant_answer(&self, text: &str) -> ApplicantAnswer {
        match self.polarity(text) {
            Polarity::Yes => ApplicantAnswer::Confirm,
            Polarity::No => ApplicantAnswer::Decline,
            Polarity::Mixed | Polarity::None => ApplicantAnswer::Unclear,
        }
    }

    fn polarity(&self, text: &str) -> Polarity {
        let text = self.idiom.replace_all(text, "");
        match (self.positive.is_match(&text), self.negative.is_match(&text)) {
            (true, false) => Polarity::Yes,
            (false, true) => Polarity::No,
            (true, true) => Polarity::Mixed,
            (false, false) => Polarity::None,
        }
    }
}
