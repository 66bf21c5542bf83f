//! Email value types and pure text helpers (no I/O).

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").expect("valid address regex")
});

/// An inbound email as observed by the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Transport-native message id.
    pub id: String,
    /// Conversation/thread id, when the transport has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Sender address, normalized to lowercase without display name.
    pub sender: String,
    /// To recipients.
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl EmailMessage {
    /// Body with quoted reply text removed.
    pub fn fresh_text(&self) -> String {
        let stripped = strip_quoted_text(&self.body);
        if stripped.trim().is_empty() {
            self.body.trim().to_string()
        } else {
            stripped
        }
    }
}

/// An email to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Message id to reply to; keeps the transport thread intact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

impl OutgoingEmail {
    /// A new message starting its own thread.
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            in_reply_to: None,
        }
    }

    /// A threaded reply to `original`.
    pub fn reply_to(original: &EmailMessage, body: impl Into<String>) -> Self {
        Self {
            to: original.sender.clone(),
            subject: reply_subject(&original.subject),
            body: body.into(),
            in_reply_to: Some(original.id.clone()),
        }
    }
}

/// Receipt for a sent email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentEmail {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Prefix a subject with `Re: ` unless it already has one.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        return "Re: Your message".to_string();
    }
    if trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

/// Normalize a `From`-style value (`"Jane <Jane@X.com>"`) to `jane@x.com`.
///
/// Falls back to the trimmed, lowercased input when no address is present.
pub fn normalize_address(raw: &str) -> String {
    ADDRESS_RE
        .find(raw)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| raw.trim().to_lowercase())
}

/// All email addresses mentioned in `text`, lowercased, in order, without duplicates.
pub fn extract_addresses(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in ADDRESS_RE.find_iter(text) {
        let addr = m.as_str().to_lowercase();
        if !found.contains(&addr) {
            found.push(addr);
        }
    }
    found
}

/// Strip quoted text from an email body.
///
/// Drops `>` lines, and everything after an "On ... wrote:" attribution
/// or an "Original Message" separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

/// Truncate to at most `max` characters, appending `...` when cut.
pub fn excerpt(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> EmailMessage {
        EmailMessage {
            id: "m-1".into(),
            thread_id: Some("t-1".into()),
            sender: "alice@example.com".into(),
            recipients: vec!["mailhub@agentmail.to".into()],
            subject: "Application".into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn strip_basic_quoted_lines() {
        let body = "Hello!\n\n> This is quoted\n> Another quoted line\nThanks";
        assert_eq!(strip_quoted_text(body), "Hello!\n\nThanks");
    }

    #[test]
    fn strip_on_wrote_attribution() {
        let body = concat!(
            "Yes, Tuesday works.\n\n",
            "On Mon, Jan 1, 2026 at 10:00 AM MailHub <mailhub@agentmail.to> wrote:\n",
            "> Can you confirm?",
        );
        assert_eq!(strip_quoted_text(body), "Yes, Tuesday works.");
    }

    #[test]
    fn strip_original_message_separator() {
        let body = "My reply\n\n--- Original Message ---\nOld stuff here";
        assert_eq!(strip_quoted_text(body), "My reply");
    }

    #[test]
    fn fresh_text_falls_back_to_full_body() {
        let msg = message("> only quoted");
        assert_eq!(msg.fresh_text(), "> only quoted");
    }

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Application"), "Re: Application");
        assert_eq!(reply_subject("Re: Application"), "Re: Application");
        assert_eq!(reply_subject("RE: Application"), "RE: Application");
        assert_eq!(reply_subject("  "), "Re: Your message");
    }

    #[test]
    fn normalize_display_name_address() {
        assert_eq!(normalize_address("Jane Doe <Jane.Doe@Example.com>"), "jane.doe@example.com");
        assert_eq!(normalize_address(" BOB@x.io "), "bob@x.io");
        assert_eq!(normalize_address("unknown"), "unknown");
    }

    #[test]
    fn extract_addresses_dedups_in_order() {
        let text = "Candidate a@x.com (also A@X.com) and b@y.org";
        assert_eq!(extract_addresses(text), vec!["a@x.com", "b@y.org"]);
    }

    #[test]
    fn reply_to_threads_on_original() {
        let msg = message("hi");
        let out = OutgoingEmail::reply_to(&msg, "thanks");
        assert_eq!(out.to, "alice@example.com");
        assert_eq!(out.subject, "Re: Application");
        assert_eq!(out.in_reply_to.as_deref(), Some("m-1"));
    }

    #[test]
    fn excerpt_truncates_on_chars() {
        assert_eq!(excerpt("héllo world", 5), "héllo...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
