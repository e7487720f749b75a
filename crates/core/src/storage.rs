use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    Agent, Area, AreaId, NewOrder, OrderId, OrderStatus, OrderSummary, Product, Shop, UserId,
};

/// Backend-neutral persistence failure. Concrete stores map their driver
/// errors into these variants; the underlying cause goes to the operator log,
/// never to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage I/O failed: {0}")]
    Io(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Read contract for the static reference catalog. Results are stably
/// ordered (grouping name, then item name); empty results are valid and
/// short-circuit the workflow with a terminal message.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn list_areas(&self) -> Result<Vec<Area>, StorageError>;
    async fn list_shops(&self, area_id: AreaId) -> Result<Vec<Shop>, StorageError>;
    async fn list_products(&self) -> Result<Vec<Product>, StorageError>;
}

/// Registered-identity lookup. Absence is an expected outcome and rejects
/// the ordering entry points with a registration-required message.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<Agent>, StorageError>;
}

/// Durable order persistence. The two shipped backends (relational and
/// append-only file) implement the same five operations; the workflow never
/// assumes either physical layout.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists one header and its line items atomically: either the whole
    /// order becomes visible or none of it does. Allocates and returns the
    /// durable order identifier; status initializes to
    /// [`OrderStatus::Pending`].
    async fn submit(&self, order: NewOrder) -> Result<OrderId, StorageError>;

    /// Recent orders for an agent, newest first, capped at
    /// [`LIST_RECENT_LIMIT`].
    async fn list_by_agent(&self, agent_id: UserId) -> Result<Vec<OrderSummary>, StorageError>;

    /// Returns `false` when the order does not exist; that is a benign
    /// nothing-to-update, not an error.
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StorageError>;

    /// Removes the header and all line items. Returns `false` when the order
    /// did not exist. The identifier is never reissued afterwards.
    async fn delete(&self, id: OrderId) -> Result<bool, StorageError>;
}

/// Display cap for order listings.
pub const LIST_RECENT_LIMIT: usize = 20;

/// Monotonic durable sequence. `next` persists the incremented value before
/// returning it, so a crash between persist and use burns an identifier but
/// never repeats one. Relational backends may satisfy this with the header
/// table's auto-increment key instead of a standalone counter.
#[async_trait]
pub trait OrderIdAllocator: Send + Sync {
    async fn next(&self) -> Result<OrderId, StorageError>;
}
