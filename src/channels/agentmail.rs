//! AgentMail REST transport.
//!
//! Inbound messages are listed per inbox and their full text fetched once
//! (cached by message id). Outbound mail uses the reply endpoint when the
//! email answers an existing message, so the thread stays intact.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channels::transport::EmailTransport;
use crate::channels::types::{EmailMessage, OutgoingEmail, SentEmail, normalize_address};
use crate::error::TransportError;

pub const DEFAULT_BASE_URL: &str = "https://api.agentmail.to/v0";
const TRANSPORT: &str = "agentmail";
const MAX_PAGES: usize = 10;

// ── API types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct InboxList {
    #[serde(default)]
    inboxes: Vec<Inbox>,
}

#[derive(Debug, Deserialize)]
struct Inbox {
    inbox_id: String,
}

#[derive(Debug, Serialize)]
struct CreateInbox<'a> {
    username: &'a str,
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageItem {
    message_id: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default, alias = "from_")]
    from: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    preview: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(alias = "created_at")]
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MessageDetail {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ReplyBody<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
    #[serde(default)]
    thread_id: Option<String>,
}

// ── Transport ───────────────────────────────────────────────────────

/// AgentMail transport (HTTP + bearer auth).
pub struct AgentMailTransport {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    inbox_id: OnceLock<String>,
    bodies: Mutex<HashMap<String, String>>,
}

impl AgentMailTransport {
    pub fn new(api_key: SecretString, base_url: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| request_failed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            inbox_id: OnceLock::new(),
            bodies: Mutex::new(HashMap::new()),
        })
    }

    /// Use a known inbox without listing or creating.
    pub fn with_inbox(self, inbox_id: impl Into<String>) -> Self {
        let _ = self.inbox_id.set(inbox_id.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn inbox(&self) -> Result<&str, TransportError> {
        self.inbox_id
            .get()
            .map(String::as_str)
            .ok_or_else(|| TransportError::InboxUnavailable("inbox not initialized".into()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;
        decode(resp).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;
        decode(resp).await
    }

    /// Full text of a message, fetched once and cached.
    async fn message_text(&self, inbox: &str, item: &MessageItem) -> String {
        if let Some(text) = item.text.as_ref().filter(|t| !t.trim().is_empty()) {
            return text.clone();
        }
        if let Some(cached) = self
            .bodies
            .lock()
            .ok()
            .and_then(|guard| guard.get(&item.message_id).cloned())
        {
            return cached;
        }

        let path = format!("inboxes/{inbox}/messages/{}", item.message_id);
        let text = match self.get_json::<MessageDetail>(&path, &[]).await {
            Ok(detail) => detail
                .text
                .filter(|t| !t.trim().is_empty())
                .or_else(|| detail.html.map(|h| strip_html(&h)))
                .unwrap_or_default(),
            Err(e) => {
                warn!(message_id = %item.message_id, error = %e, "Falling back to message preview");
                return item.preview.clone().unwrap_or_default();
            }
        };

        if let Ok(mut guard) = self.bodies.lock() {
            guard.insert(item.message_id.clone(), text.clone());
        }
        text
    }
}

#[async_trait]
impl EmailTransport for AgentMailTransport {
    fn name(&self) -> &str {
        TRANSPORT
    }

    async fn create_inbox(&self, username: &str) -> Result<String, TransportError> {
        if let Some(existing) = self.inbox_id.get() {
            return Ok(existing.clone());
        }

        let needle = username.to_lowercase();
        match self.get_json::<InboxList>("inboxes", &[]).await {
            Ok(list) => {
                if let Some(inbox) = list
                    .inboxes
                    .into_iter()
                    .find(|i| i.inbox_id.to_lowercase().contains(&needle))
                {
                    info!(inbox = %inbox.inbox_id, "Using existing inbox");
                    let _ = self.inbox_id.set(inbox.inbox_id);
                    return self.inbox().map(str::to_string);
                }
            }
            Err(e) => warn!(error = %e, "Could not list inboxes, creating a new one"),
        }

        let unique = format!("{username}-{}", Utc::now().timestamp());
        let created: Inbox = self
            .post_json(
                "inboxes",
                &CreateInbox {
                    username: &unique,
                    display_name: "AI Recruiter",
                },
            )
            .await
            .map_err(|e| TransportError::InboxUnavailable(e.to_string()))?;
        info!(inbox = %created.inbox_id, "Created inbox");
        let _ = self.inbox_id.set(created.inbox_id);
        self.inbox().map(str::to_string)
    }

    async fn list_new_messages(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, TransportError> {
        let inbox = self.inbox()?.to_string();
        let path = format!("inboxes/{inbox}/messages");
        let mut query = vec![
            ("limit", limit.to_string()),
            ("ascending", "true".to_string()),
        ];
        if let Some(since) = since {
            query.push(("after", since.to_rfc3339()));
        }

        let mut items: Vec<MessageItem> = Vec::new();
        let mut pages = 0;
        loop {
            let page: MessageList = self.get_json(&path, &query).await?;
            pages += 1;
            items.extend(
                page.messages
                    .into_iter()
                    .filter(|m| since.is_none_or(|s| m.timestamp >= s)),
            );
            match page.next_page_token {
                Some(token) if pages < MAX_PAGES => {
                    query.retain(|(key, _)| *key != "page_token");
                    query.push(("page_token", token));
                }
                Some(_) => {
                    warn!(pages, "Message listing truncated, the rest is fetched next poll");
                    break;
                }
                None => break,
            }
        }

        // The oldest `limit` now; the caller's watermark picks up the rest.
        items.sort_by_key(|m| m.timestamp);
        items.truncate(limit as usize);

        let mut messages = Vec::with_capacity(items.len());
        for item in &items {
            let body = self.message_text(&inbox, item).await;
            messages.push(EmailMessage {
                id: item.message_id.clone(),
                thread_id: item.thread_id.clone(),
                sender: normalize_address(&item.from),
                recipients: item.to.iter().map(|t| normalize_address(t)).collect(),
                subject: item
                    .subject
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "No Subject".to_string()),
                body,
                received_at: item.timestamp,
            });
        }

        debug!(count = messages.len(), "Listed inbox messages");
        Ok(messages)
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, TransportError> {
        let inbox = self.inbox()?.to_string();

        let sent: SendResponse = match &email.in_reply_to {
            Some(message_id) => {
                self.post_json(
                    &format!("inboxes/{inbox}/messages/{message_id}/reply"),
                    &ReplyBody { text: &email.body },
                )
                .await?
            }
            None => {
                self.post_json(
                    &format!("inboxes/{inbox}/messages/send"),
                    &SendBody {
                        to: vec![email.to.as_str()],
                        subject: &email.subject,
                        text: &email.body,
                    },
                )
                .await?
            }
        };

        info!(to = %email.to, message_id = %sent.message_id, "Email sent");
        Ok(SentEmail {
            message_id: sent.message_id,
            thread_id: sent.thread_id,
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn request_failed(reason: String) -> TransportError {
    TransportError::RequestFailed {
        transport: TRANSPORT.into(),
        reason,
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, TransportError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(TransportError::Api {
            transport: TRANSPORT.into(),
            status: status.as_u16(),
            message,
        });
    }
    resp.json().await.map_err(|e| TransportError::InvalidResponse {
        transport: TRANSPORT.into(),
        reason: e.to_string(),
    })
}

static QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<blockquote.*?</blockquote>").unwrap());
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6])\s*>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Plain text from an HTML-only body, one line per block or `<br>`.
///
/// Quoted `<blockquote>` content is dropped so the fresh reply survives
/// `strip_quoted_text`.
pub fn strip_html(html: &str) -> String {
    let text = QUOTE_RE.replace_all(html, "");
    let text = BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
