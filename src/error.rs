//! Error types for MailHub.

use crate::pipeline::candidate::CandidateState;

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Email transport errors (network, auth, unexpected payloads).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport {transport} request failed: {reason}")]
    RequestFailed { transport: String, reason: String },

    #[error("Transport {transport} returned HTTP {status}: {message}")]
    Api {
        transport: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {transport}: {reason}")]
    InvalidResponse { transport: String, reason: String },

    #[error("Inbox unavailable: {0}")]
    InboxUnavailable(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// The language model failed or answered outside the expected contract.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unknown category label: '{0}'")]
    UnknownLabel(String),

    #[error("Invalid evaluation: {0}")]
    InvalidEvaluation(String),
}

/// Attempted candidate state change that the transition table forbids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Candidate {identity} cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub identity: String,
    pub from: CandidateState,
    pub to: CandidateState,
}

/// Per-message processing errors. Caught by the poll loop, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Transition rejected: {0}")]
    Transition(#[from] TransitionError),
}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        Self::Classification(ClassificationError::Llm(e))
    }
}
