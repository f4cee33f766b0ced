//! Order types for the Livedesk dashboard.
//!
//! Provides the order record, its status model and the board columns the
//! statuses fold into, plus the status-changing actions the backend accepts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::reconcile::Entity;

/// Order status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Newly placed.
    Pending,
    /// Waiting for the customer to pay.
    AwaitingPayment,
    /// Being processed.
    Processing,
    /// Accepted by the store.
    Confirmed,
    /// Payment captured.
    Paid,
    /// In the kitchen.
    Preparing,
    /// Ready for pickup or dispatch.
    Ready,
    /// With the courier.
    OutForDelivery,
    /// Handed to a carrier.
    Shipped,
    /// Delivered to the customer.
    Delivered,
    /// Cancelled.
    Cancelled,
    /// Refunded.
    Refunded,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Returns the board column this status is displayed in.
    #[must_use]
    pub const fn column(&self) -> BoardColumn {
        match self {
            Self::Pending | Self::AwaitingPayment | Self::Unknown => BoardColumn::Pending,
            Self::Confirmed | Self::Paid => BoardColumn::Confirmed,
            Self::Processing | Self::Preparing => BoardColumn::Preparing,
            Self::Ready => BoardColumn::Ready,
            Self::OutForDelivery | Self::Shipped => BoardColumn::OutForDelivery,
            Self::Delivered => BoardColumn::Delivered,
            Self::Cancelled | Self::Refunded => BoardColumn::Cancelled,
        }
    }

    /// Returns true if no further transitions are expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Processing => "processing",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::OutForDelivery => "out_for_delivery",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Columns of the order board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoardColumn {
    /// Pending and awaiting payment.
    Pending,
    /// Confirmed or paid.
    Confirmed,
    /// Processing or preparing.
    Preparing,
    /// Ready.
    Ready,
    /// Out for delivery or shipped.
    OutForDelivery,
    /// Delivered.
    Delivered,
    /// Cancelled or refunded.
    Cancelled,
}

impl BoardColumn {
    /// All columns, left to right.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Confirmed,
        Self::Preparing,
        Self::Ready,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Returns the status an order gets when dropped into this column.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        match self {
            Self::Pending => OrderStatus::Pending,
            Self::Confirmed => OrderStatus::Confirmed,
            Self::Preparing => OrderStatus::Preparing,
            Self::Ready => OrderStatus::Ready,
            Self::OutForDelivery => OrderStatus::OutForDelivery,
            Self::Delivered => OrderStatus::Delivered,
            Self::Cancelled => OrderStatus::Cancelled,
        }
    }
}

/// An order record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID.
    pub id: String,

    /// Human-facing order number.
    pub order_number: Option<String>,

    /// Fulfilment status.
    pub status: OrderStatus,

    /// Payment status.
    pub payment_status: Option<String>,

    /// Customer display name.
    pub customer_name: Option<String>,

    /// Order total as a decimal string.
    pub total: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Field patch for an [`Order`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    /// New status.
    pub status: Option<OrderStatus>,

    /// New payment status.
    pub payment_status: Option<String>,
}

impl OrderPatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            payment_status: None,
        }
    }

    /// Sets the payment status.
    #[must_use]
    pub fn with_payment_status(mut self, payment_status: impl Into<String>) -> Self {
        self.payment_status = Some(payment_status.into());
        self
    }
}

impl Entity for Order {
    type Id = String;
    type Patch = OrderPatch;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn apply(&mut self, patch: &OrderPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref payment_status) = patch.payment_status {
            self.payment_status = Some(payment_status.clone());
        }
    }

    fn capture(&self, patch: &OrderPatch) -> OrderPatch {
        OrderPatch {
            status: patch.status.map(|_| self.status),
            // an absent payment status cannot be restored through a patch
            payment_status: patch
                .payment_status
                .as_ref()
                .and(self.payment_status.clone()),
        }
    }
}

/// A status-changing backend action on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    /// Generic status transition.
    UpdateStatus(OrderStatus),
    /// Record a payment.
    MarkPaid {
        /// External payment reference.
        payment_reference: Option<String>,
    },
    /// Attach tracking and mark shipped.
    Ship {
        /// Carrier tracking code.
        tracking_code: Option<String>,
        /// Carrier name.
        carrier: Option<String>,
    },
    /// Cancel the order.
    Cancel {
        /// Cancellation reason.
        reason: Option<String>,
    },
}

impl OrderAction {
    /// Confirms the order.
    #[must_use]
    pub const fn confirm() -> Self {
        Self::UpdateStatus(OrderStatus::Confirmed)
    }

    /// Marks the order delivered.
    #[must_use]
    pub const fn deliver() -> Self {
        Self::UpdateStatus(OrderStatus::Delivered)
    }

    /// Marks the order as waiting for payment.
    #[must_use]
    pub const fn mark_awaiting_payment() -> Self {
        Self::UpdateStatus(OrderStatus::AwaitingPayment)
    }

    /// Starts processing.
    #[must_use]
    pub const fn start_processing() -> Self {
        Self::UpdateStatus(OrderStatus::Processing)
    }

    /// Starts preparing.
    #[must_use]
    pub const fn start_preparing() -> Self {
        Self::UpdateStatus(OrderStatus::Preparing)
    }

    /// Marks the order ready.
    #[must_use]
    pub const fn mark_ready() -> Self {
        Self::UpdateStatus(OrderStatus::Ready)
    }

    /// Hands the order to the courier.
    #[must_use]
    pub const fn mark_out_for_delivery() -> Self {
        Self::UpdateStatus(OrderStatus::OutForDelivery)
    }

    /// Returns the action that moves an order to `status`.
    ///
    /// Statuses with a dedicated endpoint use it.
    #[must_use]
    pub const fn for_status(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Paid => Self::MarkPaid {
                payment_reference: None,
            },
            OrderStatus::Shipped => Self::Ship {
                tracking_code: None,
                carrier: None,
            },
            OrderStatus::Cancelled => Self::Cancel { reason: None },
            other => Self::UpdateStatus(other),
        }
    }

    /// Returns the action for dropping a card into `column`.
    #[must_use]
    pub const fn move_to(column: BoardColumn) -> Self {
        Self::for_status(column.status())
    }

    /// Returns the status the order should have once the action succeeds.
    #[must_use]
    pub const fn target_status(&self) -> OrderStatus {
        match self {
            Self::UpdateStatus(status) => *status,
            Self::MarkPaid { .. } => OrderStatus::Paid,
            Self::Ship { .. } => OrderStatus::Shipped,
            Self::Cancel { .. } => OrderStatus::Cancelled,
        }
    }

    /// Returns the optimistic patch for this action.
    #[must_use]
    pub fn optimistic_patch(&self) -> OrderPatch {
        let patch = OrderPatch::status(self.target_status());
        match self {
            Self::MarkPaid { .. } => patch.with_payment_status("paid"),
            _ => patch,
        }
    }

    /// Returns the endpoint segment under `/stores/orders/{id}/`.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::UpdateStatus(_) => "update_status",
            Self::MarkPaid { .. } => "mark_paid",
            Self::Ship { .. } => "add_tracking",
            Self::Cancel { .. } => "cancel",
        }
    }

    /// Returns the JSON request body.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::UpdateStatus(status) => json!({ "status": status }),
            Self::MarkPaid { payment_reference } => {
                json!({ "payment_reference": payment_reference })
            }
            Self::Ship {
                tracking_code,
                carrier,
            } => json!({ "tracking_code": tracking_code, "carrier": carrier }),
            Self::Cancel { reason } => json!({ "reason": reason }),
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateStatus(status) => write!(f, "update_status({})", status),
            Self::MarkPaid { .. } => write!(f, "mark_paid"),
            Self::Ship { .. } => write!(f, "ship"),
            Self::Cancel { .. } => write!(f, "cancel"),
        }
    }
}
