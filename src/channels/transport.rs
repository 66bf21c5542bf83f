//! The email transport capability: pure I/O, no recruiting logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::channels::types::{EmailMessage, OutgoingEmail, SentEmail};
use crate::error::TransportError;

/// A mailbox the agent can read from and send through.
///
/// Implementations must return messages oldest first so the poll loop
/// can process them in arrival order.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Transport name, for logs.
    fn name(&self) -> &str;

    /// Reuse or create the agent inbox and return its address.
    async fn create_inbox(&self, username: &str) -> Result<String, TransportError>;

    /// The oldest `limit` messages received at or after `since`.
    ///
    /// Callers page forward by moving `since` to the newest message they
    /// have handled.
    async fn list_new_messages(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, TransportError>;

    /// Send one message.
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, TransportError>;
}
