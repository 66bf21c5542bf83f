//! In-memory transport: an inbox you can push into and a log of sent mail.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::channels::transport::EmailTransport;
use crate::channels::types::{EmailMessage, OutgoingEmail, SentEmail, normalize_address};
use crate::error::TransportError;

/// In-memory `EmailTransport`.
///
/// `fail_next_sends(n)` makes the next `n` sends fail, for exercising
/// error paths.
#[derive(Default)]
pub struct MemoryTransport {
    address: Mutex<Option<String>>,
    inbox: Mutex<Vec<EmailMessage>>,
    sent: Mutex<Vec<(OutgoingEmail, SentEmail)>>,
    failing_sends: AtomicU32,
    failing_recipient: Mutex<Option<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message into the inbox. Returns its generated id.
    pub fn deliver(&self, from: &str, subject: &str, body: &str) -> String {
        self.deliver_in_thread(from, subject, body, None)
    }

    /// Deliver a message that belongs to an existing thread.
    pub fn deliver_in_thread(
        &self,
        from: &str,
        subject: &str,
        body: &str,
        thread_id: Option<&str>,
    ) -> String {
        let id = format!("msg-{}", Uuid::new_v4());
        let to = lock(&self.address).clone().unwrap_or_default();
        let mut inbox = lock(&self.inbox);
        // Arrival times are strictly increasing, like a real mailbox clock.
        let received_at = match inbox.last() {
            Some(last) if last.received_at >= Utc::now() => {
                last.received_at + chrono::Duration::microseconds(1)
            }
            _ => Utc::now(),
        };
        let message = EmailMessage {
            id: id.clone(),
            thread_id: Some(thread_id.map_or_else(|| format!("thr-{id}"), str::to_string)),
            sender: normalize_address(from),
            recipients: vec![to],
            subject: subject.to_string(),
            body: body.to_string(),
            received_at,
        };
        inbox.push(message);
        id
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        lock(&self.sent).iter().map(|(email, _)| email.clone()).collect()
    }

    /// Emails sent to `address`.
    pub fn sent_to(&self, address: &str) -> Vec<OutgoingEmail> {
        lock(&self.sent)
            .iter()
            .filter(|(e, _)| e.to.eq_ignore_ascii_case(address))
            .map(|(e, _)| e.clone())
            .collect()
    }

    /// Receipt of the most recent email sent to `address`.
    pub fn last_receipt_to(&self, address: &str) -> Option<SentEmail> {
        lock(&self.sent)
            .iter()
            .rev()
            .find(|(e, _)| e.to.eq_ignore_ascii_case(address))
            .map(|(_, receipt)| receipt.clone())
    }

    pub fn clear_sent(&self) {
        lock(&self.sent).clear();
    }

    pub fn fail_next_sends(&self, count: u32) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Make every send to `address` fail.
    pub fn fail_sends_to(&self, address: &str) {
        *lock(&self.failing_recipient) = Some(normalize_address(address));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl EmailTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_inbox(&self, username: &str) -> Result<String, TransportError> {
        let mut address = lock(&self.address);
        Ok(address
            .get_or_insert_with(|| format!("{}@memory.local", username.to_lowercase()))
            .clone())
    }

    async fn list_new_messages(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, TransportError> {
        // Oldest first, like one ascending page of a real listing.
        Ok(lock(&self.inbox)
            .iter()
            .filter(|m| since.is_none_or(|s| m.received_at >= s))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, TransportError> {
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
            || lock(&self.failing_recipient)
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(&email.to));
        if failing {
            return Err(TransportError::RequestFailed {
                transport: "memory".into(),
                reason: "simulated send failure".into(),
            });
        }

        let receipt = SentEmail {
            message_id: format!("sent-{}", Uuid::new_v4()),
            thread_id: Some(format!("thr-{}", Uuid::new_v4())),
        };
        lock(&self.sent).push((email.clone(), receipt.clone()));
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inbox_address_is_stable() {
        let t = MemoryTransport::new();
        let first = t.create_inbox("MailHub").await.unwrap();
        let second = t.create_inbox("other").await.unwrap();
        assert_eq!(first, "mailhub@memory.local");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn list_keeps_arrival_order_and_limit() {
        let t = MemoryTransport::new();
        t.deliver("a@x.com", "one", "1");
        t.deliver("b@x.com", "two", "2");
        t.deliver("c@x.com", "three", "3");

        let all = t.list_new_messages(None, 20).await.unwrap();
        let subjects: Vec<_> = all.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["one", "two", "three"]);

        let page = t.list_new_messages(None, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].subject, "one");

        let rest = t.list_new_messages(Some(page[1].received_at), 2).await.unwrap();
        let subjects: Vec<_> = rest.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["two", "three"]);
        assert!(rest[0].received_at < rest[1].received_at);
    }

    #[tokio::test]
    async fn simulated_failures_are_consumed() {
        let t = MemoryTransport::new();
        t.fail_next_sends(1);
        let email = OutgoingEmail::new("a@x.com", "s", "b");
        assert!(t.send(&email).await.is_err());
        assert!(t.send(&email).await.is_ok());
        assert_eq!(t.sent_to("A@X.com").len(), 1);
        assert!(t.last_receipt_to("a@x.com").is_some_and(|r| r.thread_id.is_some()));
        assert!(t.last_receipt_to("b@x.com").is_none());
    }
}
