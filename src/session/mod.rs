//! Ordering-session state and its persisted identifier.

pub mod state;
pub mod store;

pub use state::{OrderSession, SessionMode};
pub use store::SessionStore;
