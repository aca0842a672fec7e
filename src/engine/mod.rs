//! Conversational clarification state machine.
//!
//! [`ConversationEngine`] owns the [`OrderSession`](crate::session::OrderSession)
//! and turns capture events and service responses into [`Transition`]s.

pub mod machine;
pub mod state;

pub use machine::{dispatch, ConversationEngine};
pub use state::{EngineError, EngineState, Operation, OrderComplete, Submission, Transition};
