//! Advisor core — session state, parameter collection, and the dual-agent
//! orchestration loop.
//!
//! Submodules:
//! - `store`: SQLite persistence for sessions, parameters, history, matches
//! - `tracker`: parameter state machine with validation and normalisation
//! - `extraction`: LLM-backed parameter mining from dialogue
//! - `conversation`: reply generation and tool-call directive parsing
//! - `orchestrator`: single-entry turn handler wiring the agents together
//! - `types`: shared types across the advisor core
//! - `errors`: advisor-level error types

pub mod conversation;
pub mod errors;
pub mod extraction;
pub mod orchestrator;
pub mod store;
pub mod tracker;
pub mod types;

pub use errors::AdvisorError;
pub use orchestrator::Orchestrator;
pub use store::{SessionLocks, SessionStore};
pub use tracker::ParameterTracker;
pub use types::{
    AgentType, EmploymentStatus, LoanParameters, LoanPurpose, MessageRole, ParameterField,
    ParameterTracking, Session, SessionSnapshot, SessionStatus, StoredMessage, TurnAction,
    TurnResult,
};
