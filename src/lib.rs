//! MailHub: an email recruiting agent.
//!
//! Polls an inbox, classifies applicant mail with an LLM, tracks each
//! applicant through the hiring pipeline, and replies.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
