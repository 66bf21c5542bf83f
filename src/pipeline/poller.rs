//! Poll loop: fetch new mail on a fixed interval and dispatch it in order.
//!
//! One message is processed to completion before the next. A message that
//! fails stays unprocessed and is retried next cycle, up to `max_attempts`.
//!
//! `since` is a watermark: after each cycle it moves to the newest message
//! handled, but never past a message still waiting for a retry. The bound is
//! inclusive, so ties are re-fetched and filtered by the processed-id set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::channels::transport::EmailTransport;
use crate::config::MailhubConfig;
use crate::error::TransportError;
use crate::pipeline::dispatcher::Dispatcher;
use crate::pipeline::registry::CandidateRegistry;

/// Loop timing and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub fetch_limit: u32,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            fetch_limit: 20,
            max_attempts: 3,
        }
    }
}

impl From<&MailhubConfig> for PollSettings {
    fn from(config: &MailhubConfig) -> Self {
        Self {
            interval: config.poll_interval,
            fetch_limit: config.fetch_limit,
            max_attempts: config.max_attempts,
        }
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Messages returned by the transport, including ones seen before.
    pub fetched: usize,
    pub processed: usize,
    /// Sent by our own inbox.
    pub skipped: usize,
    /// Failed, will be retried.
    pub failed: usize,
    /// Failed for the last time.
    pub dropped: usize,
    pub emails_sent: usize,
}

pub struct PollLoop {
    dispatcher: Dispatcher,
    transport: Arc<dyn EmailTransport>,
    inbox_address: String,
    settings: PollSettings,
    since: Option<DateTime<Utc>>,
    processed: HashSet<String>,
    attempts: HashMap<String, u32>,
    shutdown: Arc<AtomicBool>,
}

impl PollLoop {
    pub fn new(
        dispatcher: Dispatcher,
        transport: Arc<dyn EmailTransport>,
        inbox_address: impl Into<String>,
        settings: PollSettings,
    ) -> Self {
        Self {
            dispatcher,
            transport,
            inbox_address: inbox_address.into().to_lowercase(),
            settings,
            since: None,
            processed: HashSet::new(),
            attempts: HashMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ignore mail received before `since`. Moves forward as mail is handled.
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Set this flag to stop the loop after the current message.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn registry(&self) -> &CandidateRegistry {
        self.dispatcher.registry()
    }

    /// Poll until the shutdown flag is set.
    pub async fn run(&mut self) {
        info!(
            inbox = %self.inbox_address,
            interval_secs = self.settings.interval.as_secs(),
            "Poll loop started"
        );

        let mut tick = tokio::time::interval(self.settings.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            if self.shutdown.load(Ordering::Relaxed) {
                info!(
                    candidates = self.dispatcher.registry().len(),
                    "Poll loop shutting down"
                );
                return;
            }

            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Poll failed");
            }
        }
    }

    /// Run a single cycle: fetch → skip seen/self → dispatch in order.
    pub async fn poll_once(&mut self) -> Result<PollStats, TransportError> {
        let messages = self
            .transport
            .list_new_messages(self.since, self.settings.fetch_limit)
            .await?;

        let mut stats = PollStats {
            fetched: messages.len(),
            ..PollStats::default()
        };
        let full_page = messages.len() >= self.settings.fetch_limit as usize;
        let mut unseen = 0;
        let mut newest_handled: Option<DateTime<Utc>> = None;
        let mut oldest_pending: Option<DateTime<Utc>> = None;

        for message in messages {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Shutdown requested, leaving rest of batch");
                break;
            }
            let received_at = message.received_at;
            newest_handled = newest_handled.max(Some(received_at));

            if self.processed.contains(&message.id) {
                continue;
            }
            unseen += 1;

            // Self-loop prevention
            if message.sender.eq_ignore_ascii_case(&self.inbox_address) {
                debug!(id = %message.id, "Skipping self-sent email");
                self.processed.insert(message.id);
                stats.skipped += 1;
                continue;
            }

            match self.dispatcher.dispatch(&message).await {
                Ok(outcome) => {
                    self.attempts.remove(&message.id);
                    self.processed.insert(message.id);
                    stats.processed += 1;
                    stats.emails_sent += outcome.emails_sent;
                }
                Err(e) => {
                    let attempts = self.attempts.entry(message.id.clone()).or_insert(0);
                    *attempts += 1;
                    if *attempts >= self.settings.max_attempts {
                        error!(
                            id = %message.id,
                            sender = %message.sender,
                            attempts = *attempts,
                            error = %e,
                            "Giving up on message"
                        );
                        self.attempts.remove(&message.id);
                        self.processed.insert(message.id);
                        stats.dropped += 1;
                    } else {
                        warn!(
                            id = %message.id,
                            sender = %message.sender,
                            attempts = *attempts,
                            error = %e,
                            "Failed to process message, will retry next cycle"
                        );
                        stats.failed += 1;
                        if oldest_pending.is_none_or(|t| received_at < t) {
                            oldest_pending = Some(received_at);
                        }
                    }
                }
            }
        }

        if full_page && unseen == 0 {
            warn!(
                fetch_limit = self.settings.fetch_limit,
                "A full page of already-seen mail, raise MAILHUB_FETCH_LIMIT"
            );
        }
        if let Some(mark) = oldest_pending.or(newest_handled) {
            self.since = self.since.max(Some(mark));
        }

        if stats.processed > 0 {
            info!(
                candidates = self.dispatcher.registry().len(),
                processed = stats.processed,
                emails_sent = stats.emails_sent,
                "Poll cycle complete"
            );
        }
        Ok(stats)
    }
}
