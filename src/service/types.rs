//! Wire types exchanged with the order-analysis service.
//!
//! Every order operation answers with the same envelope:
//!
//! ```text
//! { "status": "success" | "error",
//!   "session_id": "…",              // optional, may also sit inside data
//!   "data": { "message", "order", "needs_clarification",
//!             "clarification_items", "is_casual_conversation",
//!             "order_complete", "asking_for_more_items",
//!             "session_id"? } }
//! ```
//!
//! [`OrderResponse::from_envelope`] flattens this into the single value the
//! conversation engine consumes.

use serde::{Deserialize, Serialize};

use super::client::ServiceError;

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// One line of the running order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Unit options (size, milk, extra shot, …).  Treated as a set.
    #[serde(default)]
    pub options: Vec<String>,
    /// Line price in whole currency units.
    #[serde(default)]
    pub price: i64,
}

fn default_quantity() -> u32 {
    1
}

impl OrderLine {
    /// Options with duplicates removed, preserving first occurrence.
    pub fn unique_options(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.options.len());
        for option in &self.options {
            if !seen.contains(&option.as_str()) {
                seen.push(option);
            }
        }
        seen
    }
}

/// Full order snapshot as returned by the service.
///
/// The service always sends the whole order, so the client replaces its copy
/// instead of merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub total_price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,
    /// Set by the client when the order is committed.
    #[serde(default)]
    pub order_complete: bool,
}

impl Order {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copy of this order marked as committed.
    pub fn completed(&self) -> Order {
        Order {
            order_complete: true,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Raw `{status, session_id, data}` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub status: ResponseStatus,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
    /// Error detail, when the service sends one.
    #[serde(default)]
    pub message: Option<String>,
}

/// `data` object of an order operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderData {
    pub message: Option<String>,
    pub order: Option<Order>,
    pub needs_clarification: bool,
    pub clarification_items: Vec<String>,
    pub is_casual_conversation: bool,
    pub order_complete: bool,
    pub asking_for_more_items: bool,
    pub session_id: Option<String>,
}

// ---------------------------------------------------------------------------
// OrderResponse
// ---------------------------------------------------------------------------

/// Flattened result of `analyze` / `clarify`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderResponse {
    pub message: Option<String>,
    pub is_casual_conversation: bool,
    pub needs_clarification: bool,
    pub clarification_items: Vec<String>,
    pub order: Option<Order>,
    pub session_id: Option<String>,
    /// The service considers the order finished.
    pub order_complete: bool,
    /// The message invites the customer to order more.
    pub asking_for_more_items: bool,
}

impl OrderResponse {
    /// Validate an envelope and flatten it.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Malformed`] when the status is not `success`, `data` is
    /// missing, `data` carries neither a message nor an order, or an order
    /// line has a zero quantity.
    pub fn from_envelope(envelope: ResponseEnvelope<OrderData>) -> Result<Self, ServiceError> {
        if envelope.status != ResponseStatus::Success {
            return Err(ServiceError::Malformed(format!(
                "service reported error: {}",
                envelope.message.as_deref().unwrap_or("no detail")
            )));
        }
        let data = envelope
            .data
            .ok_or_else(|| ServiceError::Malformed("response has no data".into()))?;
        if data.message.is_none() && data.order.is_none() {
            return Err(ServiceError::Malformed(
                "response carries neither message nor order".into(),
            ));
        }
        if let Some(line) = data
            .order
            .iter()
            .flat_map(|order| &order.items)
            .find(|line| line.quantity == 0)
        {
            return Err(ServiceError::Malformed(format!(
                "order line {:?} has zero quantity",
                line.name
            )));
        }

        Ok(Self {
            message: data.message.filter(|m| !m.trim().is_empty()),
            is_casual_conversation: data.is_casual_conversation,
            needs_clarification: data.needs_clarification,
            clarification_items: data.clarification_items,
            order: data.order,
            session_id: envelope
                .session_id
                .or(data.session_id)
                .filter(|id| !id.is_empty()),
            order_complete: data.order_complete,
            asking_for_more_items: data.asking_for_more_items,
        })
    }

    /// First clarification item, if any.
    pub fn first_clarification(&self) -> Option<&str> {
        self.clarification_items.first().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuOption {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base_price: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub options: Vec<MenuOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<MenuItem>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<OrderResponse, ServiceError> {
        let envelope: ResponseEnvelope<OrderData> = serde_json::from_value(value).unwrap();
        OrderResponse::from_envelope(envelope)
    }

    #[test]
    fn parses_full_analyze_response() {
        let response = parse(json!({
            "status": "success",
            "session_id": "s-1",
            "data": {
                "order": {
                    "items": [{"name": "아메리카노", "quantity": 2, "options": ["아이스"], "price": 8000}],
                    "total_price": 8000,
                    "special_requests": "덜 달게"
                },
                "message": "아메리카노 2잔 주문되었습니다.",
                "needs_clarification": false,
                "clarification_items": [],
                "is_casual_conversation": false,
                "order_complete": false,
                "should_continue_ordering": true,
                "asking_for_more_items": true
            }
        }))
        .unwrap();

        assert_eq!(response.session_id.as_deref(), Some("s-1"));
        let order = response.order.unwrap();
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.total_price, 8000);
        assert_eq!(order.special_requests.as_deref(), Some("덜 달게"));
        assert!(!order.order_complete);
        assert!(response.asking_for_more_items);
    }

    #[test]
    fn session_id_inside_data_is_accepted() {
        let response = parse(json!({
            "status": "success",
            "data": {"message": "안녕하세요", "session_id": "inner"}
        }))
        .unwrap();
        assert_eq!(response.session_id.as_deref(), Some("inner"));
        assert!(response.order.is_none());
    }

    #[test]
    fn error_status_is_malformed() {
        let err = parse(json!({"status": "error", "message": "boom"})).unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn missing_data_or_payload_is_malformed() {
        assert!(matches!(
            parse(json!({"status": "success"})),
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            parse(json!({"status": "success", "data": {"needs_clarification": true}})),
            Err(ServiceError::Malformed(_))
        ));
    }

    #[test]
    fn blank_message_is_treated_as_absent() {
        let response = parse(json!({
            "status": "success",
            "data": {"message": "  ", "order": {"items": [], "total_price": 0}}
        }))
        .unwrap();
        assert!(response.message.is_none());
    }

    #[test]
    fn zero_quantity_line_is_malformed() {
        let err = parse(json!({
            "status": "success",
            "data": {
                "message": "라떼 0잔",
                "order": {"items": [
                    {"name": "아메리카노", "quantity": 1, "price": 4000},
                    {"name": "라떼", "quantity": 0, "price": 0}
                ], "total_price": 4000}
            }
        }))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(ref m) if m.contains("라떼")));
    }

    #[test]
    fn line_defaults_and_unique_options() {
        let line: OrderLine =
            serde_json::from_value(json!({"name": "라떼", "options": ["샷 추가", "샷 추가", "오트"]}))
                .unwrap();
        assert_eq!(line.quantity, 1);
        assert_eq!(line.price, 0);
        assert_eq!(line.unique_options(), vec!["샷 추가", "오트"]);
    }

    #[test]
    fn completed_marks_copy_only() {
        let order = Order {
            items: vec![OrderLine {
                name: "아메리카노".into(),
                quantity: 1,
                options: vec![],
                price: 4000,
            }],
            total_price: 4000,
            ..Order::default()
        };
        let done = order.completed();
        assert!(done.order_complete);
        assert!(!order.order_complete);
        assert_eq!(done.items, order.items);
    }

    #[test]
    fn parses_menu_category() {
        let categories: Vec<MenuCategory> = serde_json::from_value(json!([{
            "id": 1,
            "name": "커피",
            "description": "에스프레소 음료",
            "items": [{
                "id": 10,
                "name": "아메리카노",
                "description": "",
                "base_price": 4000,
                "image_url": null,
                "options": [{"name": "아이스"}, {"name": "샷 추가"}]
            }]
        }]))
        .unwrap();
        assert_eq!(categories[0].items[0].options.len(), 2);
        assert!(categories[0].items[0].image_url.is_none());
    }
}
