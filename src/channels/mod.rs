//! Email transport abstraction and implementations.

pub mod agentmail;
pub mod memory;
pub mod transport;
pub mod types;

pub use agentmail::AgentMailTransport;
pub use memory::MemoryTransport;
pub use transport::EmailTransport;
pub use types::{EmailMessage, OutgoingEmail, SentEmail};
