use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::{ProductId, ShopId};
use super::agent::UserId;
use crate::evidence::EvidenceRef;

/// Durable order identifier. Allocated once, strictly increasing per
/// installation, never reused even after the order is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ord{}", self.0)
    }
}

impl OrderId {
    /// Parses the `ord{n}` display form.
    pub fn parse(text: &str) -> Option<Self> {
        text.strip_prefix("ord").and_then(|n| n.parse::<i64>().ok()).map(Self)
    }
}

/// Order status is deliberately open-ended: deployments that track partial
/// deliveries append their own interim states without a schema change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Delivered,
    UnderDelivered,
    OverDelivered,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Delivered => "Delivered",
            Self::UnderDelivered => "Under-Delivered",
            Self::OverDelivered => "Over-Delivered",
            Self::Cancelled => "Cancelled",
            Self::Other(label) => label,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "Pending" => Self::Pending,
            "Delivered" => Self::Delivered,
            "Under-Delivered" => Self::UnderDelivered,
            "Over-Delivered" => Self::OverDelivered,
            "Cancelled" => Self::Cancelled,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// A single persisted line. Quantity is always positive: zero-quantity
/// entries are filtered out before an order ever reaches a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub agent_id: UserId,
    pub shop_id: ShopId,
    pub placed_at: DateTime<Utc>,
    pub evidence: Option<EvidenceRef>,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("an order must contain at least one line with a positive quantity")]
    NoLines,
}

/// Order payload handed to a store for submission. Construction filters out
/// zero-quantity lines and refuses an order that ends up empty, so every
/// persisted order satisfies the at-least-one-positive-line invariant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub agent_id: UserId,
    pub shop_id: ShopId,
    pub placed_at: DateTime<Utc>,
    pub evidence: Option<EvidenceRef>,
    lines: Vec<OrderLine>,
}

impl NewOrder {
    pub fn new(
        agent_id: UserId,
        shop_id: ShopId,
        placed_at: DateTime<Utc>,
        evidence: Option<EvidenceRef>,
        lines: impl IntoIterator<Item = (ProductId, u32)>,
    ) -> Result<Self, OrderValidationError> {
        let lines: Vec<OrderLine> = lines
            .into_iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|(product_id, quantity)| OrderLine { product_id, quantity })
            .collect();
        if lines.is_empty() {
            return Err(OrderValidationError::NoLines);
        }
        Ok(Self { agent_id, shop_id, placed_at, evidence, lines })
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }
}

/// Aggregated line as shown in listings: resolved product name plus quantity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub product_name: String,
    pub quantity: u32,
}

/// Historical order as rendered by `/status` and `/update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub placed_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub shop_name: String,
    pub area_name: String,
    pub items: Vec<SummaryItem>,
}
