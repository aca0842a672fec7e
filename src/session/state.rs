//! Process-local state of one ordering conversation.

use crate::service::Order;

/// Which remote operation the next clip is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Next clip goes to `analyze`.
    #[default]
    Fresh,
    /// Next clip answers `pending_clarification` through `clarify`.
    AwaitingClarification,
}

/// Everything the kiosk knows about the conversation in progress.
///
/// Owned by the conversation engine and handed to the presentation layer as
/// a snapshot after every transition.
///
/// Invariants kept by the engine:
/// - `mode == AwaitingClarification` implies `session_id.is_some()`.
/// - `current_order` is the last order snapshot the service sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSession {
    /// Server-issued conversation token.
    pub session_id: Option<String>,
    pub mode: SessionMode,
    pub current_order: Option<Order>,
    /// Clarification question currently shown to the user.
    pub pending_clarification: Option<String>,
    /// A clip is in flight; no other clip may be submitted.
    pub audio_processed_guard: bool,
    /// The last applied response was small talk.
    pub last_response_casual: bool,
    /// Consecutive clarification questions without a resolved turn.
    pub clarification_turns: u32,
}

impl OrderSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session continuing a conversation the server already knows.
    pub fn resumed(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn is_awaiting_clarification(&self) -> bool {
        self.mode == SessionMode::AwaitingClarification
    }

    /// `true` when closing now would commit an order.
    pub fn has_order_lines(&self) -> bool {
        self.current_order
            .as_ref()
            .is_some_and(|order| !order.is_empty())
    }

    /// Leave clarification mode.
    pub(crate) fn settle(&mut self) {
        self.mode = SessionMode::Fresh;
        self.pending_clarification = None;
        self.clarification_turns = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::OrderLine;

    #[test]
    fn new_session_is_fresh_and_empty() {
        let session = OrderSession::new();
        assert_eq!(session.mode, SessionMode::Fresh);
        assert!(session.session_id.is_none());
        assert!(!session.audio_processed_guard);
        assert!(!session.has_order_lines());
    }

    #[test]
    fn resumed_keeps_only_the_identifier() {
        let session = OrderSession::resumed("s-9");
        assert_eq!(session.session_id.as_deref(), Some("s-9"));
        assert!(!session.is_awaiting_clarification());
        assert!(session.current_order.is_none());
    }

    #[test]
    fn order_lines_detection() {
        let mut session = OrderSession::new();
        session.current_order = Some(Order::default());
        assert!(!session.has_order_lines());

        session.current_order = Some(Order {
            items: vec![OrderLine {
                name: "라떼".into(),
                quantity: 1,
                options: vec![],
                price: 4500,
            }],
            total_price: 4500,
            ..Order::default()
        });
        assert!(session.has_order_lines());
    }

    #[test]
    fn settle_clears_clarification_context() {
        let mut session = OrderSession::resumed("s-1");
        session.mode = SessionMode::AwaitingClarification;
        session.pending_clarification = Some("사이즈를 선택해주세요".into());
        session.clarification_turns = 2;

        session.settle();
        assert_eq!(session.mode, SessionMode::Fresh);
        assert!(session.pending_clarification.is_none());
        assert_eq!(session.clarification_turns, 0);
        assert_eq!(session.session_id.as_deref(), Some("s-1"));
    }
}
