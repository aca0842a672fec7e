//! Engine phases, errors and the values each step hands back to its caller.

use thiserror::Error;

use crate::service::{Order, ServiceError};
use crate::session::OrderSession;

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

/// Phases of clip processing.
///
/// ```text
/// Idle ──submit──▶ Submitting ──apply(Ok)──▶ Idle
///                             ──apply(Err)─▶ Failed ──next recording/submit──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No clip is being processed.
    #[default]
    Idle,
    /// A clip was dispatched; waiting for the service.
    Submitting,
    /// The last call failed.  Behaves like `Idle`; the guard is already clear.
    Failed,
}

impl EngineState {
    /// `true` while a remote call is outstanding.
    ///
    /// ```
    /// use voice_order_kiosk::engine::EngineState;
    ///
    /// assert!(!EngineState::Idle.is_busy());
    /// assert!(EngineState::Submitting.is_busy());
    /// assert!(!EngineState::Failed.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, EngineState::Submitting)
    }

    pub fn label(&self) -> &'static str {
        match self {
            EngineState::Idle => "Idle",
            EngineState::Submitting => "Submitting",
            EngineState::Failed => "Failed",
        }
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Why an engine step did not apply.
///
/// Every variant leaves the session usable: the guard is clear and `mode` /
/// `current_order` are untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Clarification mode without a session identifier.
    #[error("no active session to answer a clarification for")]
    NoActiveSession,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("session expired on the server")]
    SessionNotFound,

    /// A clip is already in flight.
    #[error("a clip is already being processed")]
    Busy,

    /// The response belongs to a session that has since been closed.
    #[error("response arrived for a closed session")]
    StaleResponse,
}

impl From<ServiceError> for EngineError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Malformed(msg) => EngineError::MalformedResponse(msg),
            ServiceError::SessionNotFound => EngineError::SessionNotFound,
            ServiceError::Timeout => EngineError::TransportFailure("request timed out".into()),
            other => EngineError::TransportFailure(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Remote operation chosen for a clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Analyze { session_id: Option<String> },
    Clarify { session_id: String },
}

/// Ticket for one in-flight clip.  Pass `generation` back to `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub generation: u64,
    pub operation: Operation,
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// A committed order leaving the kiosk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderComplete {
    /// Final order with `order_complete == true`.
    pub order: Order,
    pub session_id: Option<String>,
}

/// Output of one engine step.  The caller renders `status`, speaks
/// `speech` and forwards `completion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub session: OrderSession,
    pub status: String,
    pub speech: Option<String>,
    pub completion: Option<OrderComplete>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_engine_errors() {
        assert_eq!(
            EngineError::from(ServiceError::SessionNotFound),
            EngineError::SessionNotFound
        );
        assert!(matches!(
            EngineError::from(ServiceError::Malformed("x".into())),
            EngineError::MalformedResponse(_)
        ));
        assert!(matches!(
            EngineError::from(ServiceError::Status {
                code: 502,
                body: String::new()
            }),
            EngineError::TransportFailure(_)
        ));
        assert!(matches!(
            EngineError::from(ServiceError::Timeout),
            EngineError::TransportFailure(_)
        ));
    }

    #[test]
    fn labels() {
        assert_eq!(EngineState::default().label(), "Idle");
        assert_eq!(EngineState::Failed.label(), "Failed");
    }
}
