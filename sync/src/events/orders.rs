//! Order topic events.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::lenient;
use crate::channel::Envelope;
use crate::types::OrderStatus;

/// Payload shared by every order event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderNotice {
    /// Order ID, string or numeric on the wire.
    #[serde(default, deserialize_with = "lenient::id")]
    pub order_id: Option<String>,

    /// Human-facing order number.
    #[serde(default, deserialize_with = "lenient::id")]
    pub order_number: Option<String>,

    /// Status after the change, when the server includes it.
    #[serde(default)]
    pub status: Option<OrderStatus>,

    /// Payment status after the change.
    #[serde(default)]
    pub payment_status: Option<String>,

    /// Extra fields. `null` reads as empty.
    #[serde(default, deserialize_with = "lenient::object")]
    pub data: Map<String, Value>,
}

/// Envelopes pushed on `stores/{slug}/orders`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A new order was placed.
    OrderCreated(OrderNotice),
    /// Order fields changed.
    OrderUpdated(OrderNotice),
    /// Order moved to a new status.
    OrderStatusChanged(OrderNotice),
    /// Payment captured.
    PaymentReceived(OrderNotice),
    /// Unrecognized type.
    #[serde(other)]
    Unknown,
}

/// Routing key for [`OrderEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderEventKind {
    /// `order_created`.
    Created,
    /// `order_updated`.
    Updated,
    /// `order_status_changed`.
    StatusChanged,
    /// `payment_received`.
    PaymentReceived,
    /// Anything else.
    Unknown,
}

impl OrderEventKind {
    /// Every kind that signals a change to the order collection.
    pub const CHANGES: [Self; 4] = [
        Self::Created,
        Self::Updated,
        Self::StatusChanged,
        Self::PaymentReceived,
    ];
}

impl OrderEvent {
    /// Returns the notice carried by this event.
    #[must_use]
    pub const fn notice(&self) -> Option<&OrderNotice> {
        match self {
            Self::OrderCreated(n)
            | Self::OrderUpdated(n)
            | Self::OrderStatusChanged(n)
            | Self::PaymentReceived(n) => Some(n),
            Self::Unknown => None,
        }
    }
}

impl Envelope for OrderEvent {
    type Kind = OrderEventKind;

    fn kind(&self) -> OrderEventKind {
        match self {
            Self::OrderCreated(_) => OrderEventKind::Created,
            Self::OrderUpdated(_) => OrderEventKind::Updated,
            Self::OrderStatusChanged(_) => OrderEventKind::StatusChanged,
            Self::PaymentReceived(_) => OrderEventKind::PaymentReceived,
            Self::Unknown => OrderEventKind::Unknown,
        }
    }

    fn canonical_type(raw: &str) -> Option<&'static str> {
        match raw {
            "order.created" => Some("order_created"),
            "order.updated" => Some("order_updated"),
            "order.paid" => Some("payment_received"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{parse_inbound, Inbound};

    fn parse(text: &str) -> OrderEvent {
        match parse_inbound::<OrderEvent>(text).expect("parse") {
            Inbound::Event(event) => event,
            Inbound::Control(frame) => panic!("unexpected control frame {:?}", frame),
        }
    }

    #[test]
    fn test_parse_status_changed() {
        let event = parse(
            r#"{"type":"order_status_changed","order_id":"o-1","order_number":"1001","status":"ready"}"#,
        );
        assert_eq!(event.kind(), OrderEventKind::StatusChanged);
        let notice = event.notice().expect("notice");
        assert_eq!(notice.order_id.as_deref(), Some("o-1"));
        assert_eq!(notice.status, Some(OrderStatus::Ready));
        assert!(notice.data.is_empty());
    }

    #[test]
    fn test_parse_with_data() {
        let event = parse(
            r#"{"type":"order_created","order_id":"o-2","data":{"total":"12.00","items":3}}"#,
        );
        assert_eq!(event.kind(), OrderEventKind::Created);
        let notice = event.notice().expect("notice");
        assert_eq!(notice.data.get("items"), Some(&Value::from(3)));
    }

    #[test]
    fn test_legacy_names_normalized() {
        assert_eq!(
            parse(r#"{"type":"order.created","order_id":"o-1"}"#).kind(),
            OrderEventKind::Created
        );
        assert_eq!(
            parse(r#"{"type":"order.updated","order_id":"o-1"}"#).kind(),
            OrderEventKind::Updated
        );
        assert_eq!(
            parse(r#"{"type":"order.paid","order_id":"o-1"}"#).kind(),
            OrderEventKind::PaymentReceived
        );
    }

    #[test]
    fn test_unknown_type() {
        let event = parse(r#"{"type":"order_archived","order_id":"o-1"}"#);
        assert_eq!(event, OrderEvent::Unknown);
        assert!(event.notice().is_none());
    }

    #[test]
    fn test_missing_order_id_still_routes() {
        let event = parse(r#"{"type":"order_created"}"#);
        assert_eq!(event.kind(), OrderEventKind::Created);
        assert!(event.notice().expect("notice").order_id.is_none());
    }

    #[test]
    fn test_numeric_ids_and_null_data() {
        let event = parse(
            r#"{"type":"order_updated","order_id":42,"order_number":1001,"data":null}"#,
        );
        assert_eq!(event.kind(), OrderEventKind::Updated);
        let notice = event.notice().expect("notice");
        assert_eq!(notice.order_id.as_deref(), Some("42"));
        assert_eq!(notice.order_number.as_deref(), Some("1001"));
        assert!(notice.data.is_empty());
    }
}
