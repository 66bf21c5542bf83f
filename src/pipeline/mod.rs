//! Recruiting pipeline.
//!
//! Every inbound message flows through:
//! 1. `PollLoop::poll_once()`: fetch, dedup, skip our own mail
//! 2. `RulesEngine`: interviewer routing and yes/no parsing (no LLM)
//! 3. `RecruiterModel::classify()`: LLM categorization for everything else
//! 4. `route()`: the `(trigger, state)` dispatch table
//! 5. Action handler: builds the plan; the dispatcher sends, then commits

pub mod candidate;
pub mod dispatcher;
pub mod handlers;
pub mod poller;
pub mod registry;
pub mod rules;
pub mod types;

pub use candidate::{Candidate, CandidateState, InterviewStage};
pub use dispatcher::{DispatchOutcome, Dispatcher, Route, Trigger};
pub use poller::{PollLoop, PollSettings, PollStats};
pub use registry::CandidateRegistry;
pub use types::Category;
