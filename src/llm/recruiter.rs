//! Recruiting capability on top of an `LlmProvider`.
//!
//! Everything the pipeline asks of the language model goes through
//! [`RecruiterModel`]: classify a message, score an application, write a
//! reply, pull availability out of a scheduling email. [`LlmRecruiter`] is the
//! prompt-driven implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::channels::types::EmailMessage;
use crate::error::{ClassificationError, LlmError};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::candidate::{Direction, HistoryEntry};
use crate::pipeline::types::{Category, Evaluation, ReplyIntent};

const CLASSIFY_MAX_TOKENS: u32 = 50;
const EVALUATE_MAX_TOKENS: u32 = 300;
const REPLY_MAX_TOKENS: u32 = 500;
const AVAILABILITY_MAX_TOKENS: u32 = 200;

/// Classification and scoring should be repeatable.
const DECISION_TEMPERATURE: f32 = 0.0;
const REPLY_TEMPERATURE: f32 = 0.7;

const PERSONA_PROMPT: &str = "\
You are a friendly, professional AI recruiter for a tech startup.

Company: TechCorp (AI/ML startup, remote-first, great culture)
Hiring for: Software Engineers, ML Engineers, Product Managers
Process: Initial screen → Technical interview → Culture fit → Offer

Your personality:
- Warm and enthusiastic with qualified candidates
- Professional but not robotic
- Encourage candidates even when rejecting
- Always provide clear next steps
- Use the candidate's name when you know it

Remember previous conversation context when provided.
Reply with the email body only: no subject line, no placeholders.";

const CATEGORY_PROMPT: &str = "\
Categorize this email into ONE of these categories:
- new_application (someone applying for a job)
- scheduling_response (candidate providing availability)
- interviewer_feedback (interviewer responding about a candidate)
- question (candidate asking questions)
- follow_up (candidate following up on application)
- other

Respond with just the category name.";

const EVALUATION_PROMPT: &str = "\
Evaluate this job application. Return a JSON object with:
- score (integer 1-10): How qualified is this candidate?
- strengths (list of strings): What are their strengths?
- missing_skills (list of strings): What key skills are missing?
- reasoning (string): Brief explanation

Respond with the JSON object only.";

/// The language-model capability the pipeline depends on.
#[async_trait]
pub trait RecruiterModel: Send + Sync {
    /// Assign exactly one category to an inbound message.
    async fn classify(&self, message: &EmailMessage) -> Result<Category, ClassificationError>;

    /// Score a job application.
    async fn score(&self, message: &EmailMessage) -> Result<Evaluation, ClassificationError>;

    /// Write a reply to `message`, given prior conversation and what the reply must do.
    async fn generate_reply(
        &self,
        history: &[HistoryEntry],
        message: &EmailMessage,
        intent: &ReplyIntent,
    ) -> Result<String, ClassificationError>;

    /// List the interview times an applicant offered.
    async fn extract_availability(
        &self,
        message: &EmailMessage,
    ) -> Result<String, ClassificationError>;

    /// Cheap round trip to verify credentials and connectivity.
    async fn probe(&self) -> Result<(), ClassificationError>;
}

/// Prompt-driven [`RecruiterModel`].
pub struct LlmRecruiter {
    llm: Arc<dyn LlmProvider>,
}

impl LlmRecruiter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn ask(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let response = self.llm.complete(request).await?;
        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "LLM call complete"
        );
        Ok(response.content)
    }
}

#[async_trait]
impl RecruiterModel for LlmRecruiter {
    async fn classify(&self, message: &EmailMessage) -> Result<Category, ClassificationError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(CATEGORY_PROMPT),
            ChatMessage::user(format!(
                "Subject: {}\n\n{}",
                message.subject,
                message.fresh_text()
            )),
        ])
        .with_temperature(DECISION_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let raw = self.ask(request).await?;
        let category = parse_category(&raw)?;
        info!(id = %message.id, category = category.label(), "Email categorized");
        Ok(category)
    }

    async fn score(&self, message: &EmailMessage) -> Result<Evaluation, ClassificationError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(EVALUATION_PROMPT),
            ChatMessage::user(format!("Application email:\n{}", message.fresh_text())),
        ])
        .with_temperature(DECISION_TEMPERATURE)
        .with_max_tokens(EVALUATE_MAX_TOKENS);

        let raw = self.ask(request).await?;
        let evaluation = parse_evaluation(&raw)?;
        info!(sender = %message.sender, score = evaluation.score, "Candidate scored");
        Ok(evaluation)
    }

    async fn generate_reply(
        &self,
        history: &[HistoryEntry],
        message: &EmailMessage,
        intent: &ReplyIntent,
    ) -> Result<String, ClassificationError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(PERSONA_PROMPT),
            ChatMessage::user(build_reply_prompt(history, message, intent)),
        ])
        .with_temperature(REPLY_TEMPERATURE)
        .with_max_tokens(REPLY_MAX_TOKENS);

        let reply = self.ask(request).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty reply text".to_string(),
            }
            .into());
        }
        Ok(reply.to_string())
    }

    async fn extract_availability(
        &self,
        message: &EmailMessage,
    ) -> Result<String, ClassificationError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(format!(
            "Extract the available times from this email:\n{}\nList them clearly.",
            message.fresh_text()
        ))])
        .with_temperature(DECISION_TEMPERATURE)
        .with_max_tokens(AVAILABILITY_MAX_TOKENS);

        Ok(self.ask(request).await?.trim().to_string())
    }

    async fn probe(&self) -> Result<(), ClassificationError> {
        let request = CompletionRequest::new(vec![ChatMessage::user("Reply with OK.")])
            .with_max_tokens(5);
        self.ask(request).await?;
        Ok(())
    }
}

/// Build the user half of the reply prompt: history, intent, then the message.
fn build_reply_prompt(
    history: &[HistoryEntry],
    message: &EmailMessage,
    intent: &ReplyIntent,
) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for entry in history {
            let who = match entry.direction {
                Direction::Inbound => "Candidate",
                Direction::Outbound => "Our response",
            };
            prompt.push_str(&format!("{who} ({}):\n{}\n\n", entry.subject, entry.body));
        }
    }

    prompt.push_str(&intent.instructions());
    prompt.push_str(&format!(
        "\n\nEmail from: {}\nSubject: {}\nContent: {}\n\n\
         Write a response email that's helpful and professional.",
        message.sender,
        message.subject,
        message.fresh_text()
    ));
    prompt
}

/// Map a model's label reply onto a category.
///
/// `other`, or a reply naming several categories, is ambiguous and maps to
/// `Question`. A reply naming none is an error.
pub fn parse_category(raw: &str) -> Result<Category, ClassificationError> {
    let mut normalized = String::with_capacity(raw.len());
    for c in raw.trim().to_lowercase().chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if !(c == '_' && normalized.ends_with('_')) {
            normalized.push(c);
        }
    }

    let named: Vec<Category> = Category::ALL
        .into_iter()
        .filter(|c| normalized.contains(c.label()))
        .collect();
    let says_other = normalized.split('_').any(|word| word == "other");

    match named.as_slice() {
        [only] if !says_other => Ok(*only),
        [] if !says_other => Err(ClassificationError::UnknownLabel(raw.trim().to_string())),
        _ => {
            debug!(label = %raw.trim(), "Ambiguous category, defaulting to question");
            Ok(Category::Question)
        }
    }
}

/// Parse the evaluation JSON. The score is clamped to 1..=10.
pub fn parse_evaluation(raw: &str) -> Result<Evaluation, ClassificationError> {
    let json = extract_json_object(raw);
    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| ClassificationError::InvalidEvaluation(format!("{e}: {json}")))?;

    let score = match &value["score"] {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| ClassificationError::InvalidEvaluation("missing numeric score".to_string()))?;

    Ok(Evaluation {
        score: score.round().clamp(1.0, 10.0) as u8,
        strengths: string_list(&value["strengths"]),
        missing_skills: string_list(&value["missing_skills"]),
        reasoning: value["reasoning"].as_str().unwrap_or_default().to_string(),
    })
}

/// Accepts a JSON array of strings or a single string.
fn string_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        serde_json::Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Extract a JSON object from text that might have markdown fences or preamble.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
