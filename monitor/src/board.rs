//! Order board summaries.
//!
//! The monitor logs what changed between two published views instead of the
//! whole board.

use std::collections::BTreeMap;
use std::fmt;

use livedesk_sync::{BoardColumn, Order, OrderStatus};

/// Order counts per board column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardSummary {
    counts: BTreeMap<BoardColumn, usize>,
    total: usize,
}

/// A column whose count changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnChange {
    /// Column.
    pub column: BoardColumn,
    /// Count before.
    pub before: usize,
    /// Count after.
    pub after: usize,
}

/// An order that moved to a different status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMove {
    /// Order ID.
    pub order_id: String,
    /// Human-facing order number.
    pub order_number: Option<String>,
    /// Status in the previous view, `None` for new orders.
    pub from: Option<OrderStatus>,
    /// Status in the current view.
    pub to: OrderStatus,
}

impl BoardSummary {
    /// Summarizes a view.
    #[must_use]
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut counts = BTreeMap::new();
        for order in orders {
            *counts.entry(order.status.column()).or_insert(0) += 1;
        }
        Self {
            counts,
            total: orders.len(),
        }
    }

    /// Returns the count in `column`.
    #[must_use]
    pub fn count(&self, column: BoardColumn) -> usize {
        self.counts.get(&column).copied().unwrap_or(0)
    }

    /// Returns the number of orders on the board.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Returns the columns whose count differs from `previous`, left to right.
    #[must_use]
    pub fn changes_since(&self, previous: &Self) -> Vec<ColumnChange> {
        BoardColumn::ALL
            .iter()
            .filter_map(|&column| {
                let before = previous.count(column);
                let after = self.count(column);
                (before != after).then_some(ColumnChange {
                    column,
                    before,
                    after,
                })
            })
            .collect()
    }
}

impl fmt::Display for BoardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} orders", self.total)?;
        for column in BoardColumn::ALL {
            let count = self.count(column);
            if count > 0 {
                write!(f, " {:?}={}", column, count)?;
            }
        }
        Ok(())
    }
}

/// Lists orders that are new or changed status between two views.
///
/// Orders that left the view are not reported.
#[must_use]
pub fn order_moves(previous: &[Order], current: &[Order]) -> Vec<OrderMove> {
    let before: BTreeMap<&str, OrderStatus> = previous
        .iter()
        .map(|o| (o.id.as_str(), o.status))
        .collect();

    current
        .iter()
        .filter_map(|order| {
            let from = before.get(order.id.as_str()).copied();
            (from != Some(order.status)).then(|| OrderMove {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                from,
                to: order.status,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, status: OrderStatus) -> Order {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "order_number": format!("#{}", id),
            "status": status,
            "payment_status": null,
            "customer_name": null,
            "total": null,
            "created_at": "2026-01-05T12:00:00Z",
        }))
        .expect("order")
    }

    #[test]
    fn test_summary_counts_by_column() {
        let orders = vec![
            order("1", OrderStatus::Pending),
            order("2", OrderStatus::AwaitingPayment),
            order("3", OrderStatus::Paid),
            order("4", OrderStatus::Shipped),
        ];
        let summary = BoardSummary::from_orders(&orders);

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.count(BoardColumn::Pending), 2);
        assert_eq!(summary.count(BoardColumn::Confirmed), 1);
        assert_eq!(summary.count(BoardColumn::OutForDelivery), 1);
        assert_eq!(summary.count(BoardColumn::Ready), 0);
        assert_eq!(summary.to_string(), "4 orders Pending=2 Confirmed=1 OutForDelivery=1");
    }

    #[test]
    fn test_summary_changes() {
        let before = BoardSummary::from_orders(&[
            order("1", OrderStatus::Pending),
            order("2", OrderStatus::Ready),
        ]);
        let after = BoardSummary::from_orders(&[
            order("1", OrderStatus::Confirmed),
            order("2", OrderStatus::Ready),
        ]);

        assert_eq!(
            after.changes_since(&before),
            vec![
                ColumnChange {
                    column: BoardColumn::Pending,
                    before: 1,
                    after: 0,
                },
                ColumnChange {
                    column: BoardColumn::Confirmed,
                    before: 0,
                    after: 1,
                },
            ]
        );
        assert!(after.changes_since(&after).is_empty());
    }

    #[test]
    fn test_order_moves() {
        let previous = vec![order("1", OrderStatus::Pending), order("2", OrderStatus::Ready)];
        let current = vec![
            order("1", OrderStatus::Confirmed),
            order("2", OrderStatus::Ready),
            order("3", OrderStatus::Pending),
        ];

        let moves = order_moves(&previous, &current);
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].order_id, "1");
        assert_eq!(moves[0].from, Some(OrderStatus::Pending));
        assert_eq!(moves[0].to, OrderStatus::Confirmed);
        assert_eq!(moves[1].order_id, "3");
        assert_eq!(moves[1].from, None);
    }
}
