//! Append-only file backend.
//!
//! Orders live in `orders.jsonl`, one JSON record per line: submissions,
//! status changes, and delete tombstones are only ever appended, and reads
//! fold the log into the current view. The durable id sequence lives in a
//! separate `order_seq` file that is persisted before an id is handed out.
//! Reference data (catalog and registered agents) comes from `catalog.json`
//! in the same directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use orderkato_core::domain::{
    Agent, Area, AreaId, NewOrder, OrderId, OrderLine, OrderStatus, OrderSummary, Product, Shop,
    ShopId, SummaryItem, UserId,
};
use orderkato_core::evidence::EvidenceRef;
use orderkato_core::storage::{
    CatalogReader, IdentityDirectory, OrderIdAllocator, OrderStore, StorageError,
    LIST_RECENT_LIMIT,
};

const LOG_FILE: &str = "orders.jsonl";
const COUNTER_FILE: &str = "order_seq";
const CATALOG_FILE: &str = "catalog.json";

fn io_err(err: std::io::Error) -> StorageError {
    StorageError::Io(err.to_string())
}

/// Durable monotonic id sequence backed by a counter file. The incremented
/// value reaches disk (write temp, sync, rename) before it is returned, so a
/// crash can burn an id but never repeat one.
pub struct FileIdAllocator {
    path: PathBuf,
    last: Mutex<i64>,
}

impl FileIdAllocator {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        let path = dir.join(COUNTER_FILE);
        let last = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw.trim().parse::<i64>().map_err(|_| {
                StorageError::Corrupt(format!("invalid order counter `{}`", raw.trim()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => return Err(io_err(err)),
        };
        Ok(Self { path, last: Mutex::new(last) })
    }

    /// Raises the floor after a log replay, covering the case where the
    /// counter file was lost while the log survived.
    async fn ensure_at_least(&self, floor: i64) {
        let mut last = self.last.lock().await;
        if *last < floor {
            warn!(
                event_name = "order_counter_behind_log",
                counter = *last,
                floor,
                "order counter lagged the replayed log; advancing"
            );
            *last = floor;
        }
    }
}

async fn persist_counter(path: &Path, value: i64) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, value.to_string()).await.map_err(io_err)?;
    let file = tokio::fs::File::open(&tmp).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

#[async_trait]
impl OrderIdAllocator for FileIdAllocator {
    async fn next(&self) -> Result<OrderId, StorageError> {
        let mut last = self.last.lock().await;
        let candidate = *last + 1;
        persist_counter(&self.path, candidate).await?;
        *last = candidate;
        Ok(OrderId(candidate))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredOrder {
    id: OrderId,
    agent_id: UserId,
    shop_id: ShopId,
    placed_at: DateTime<Utc>,
    evidence: Option<EvidenceRef>,
    status: String,
    lines: Vec<OrderLine>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum LogRecord {
    Submitted { order: StoredOrder },
    StatusChanged { id: OrderId, status: String, at: DateTime<Utc> },
    Deleted { id: OrderId, at: DateTime<Utc> },
}

fn apply(orders: &mut Vec<StoredOrder>, record: LogRecord) {
    match record {
        LogRecord::Submitted { order } => orders.push(order),
        LogRecord::StatusChanged { id, status, .. } => {
            if let Some(order) = orders.iter_mut().find(|order| order.id == id) {
                order.status = status;
            }
        }
        LogRecord::Deleted { id, .. } => orders.retain(|order| order.id != id),
    }
}

pub struct JsonlOrderStore {
    log_path: PathBuf,
    allocator: FileIdAllocator,
    /// For resolving display names in summaries; prices and names are never
    /// denormalized into the log.
    catalog: Arc<dyn CatalogReader>,
    /// Folded view of the log. The lock also serializes appends, so the
    /// file sees one writer at a time.
    state: Mutex<Vec<StoredOrder>>,
}

impl JsonlOrderStore {
    pub async fn open(dir: &Path, catalog: Arc<dyn CatalogReader>) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        let log_path = dir.join(LOG_FILE);

        let mut orders: Vec<StoredOrder> = Vec::new();
        match tokio::fs::read_to_string(&log_path).await {
            Ok(raw) => {
                for (number, line) in raw.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record: LogRecord = serde_json::from_str(line).map_err(|err| {
                        StorageError::Corrupt(format!("orders log line {}: {err}", number + 1))
                    })?;
                    apply(&mut orders, record);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(err)),
        }

        let allocator = FileIdAllocator::open(dir).await?;
        let floor = orders.iter().map(|order| order.id.0).max().unwrap_or(0);
        allocator.ensure_at_least(floor).await;

        Ok(Self { log_path, allocator, catalog, state: Mutex::new(orders) })
    }

    async fn append(&self, record: &LogRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(record)
            .map_err(|err| StorageError::Corrupt(err.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.sync_data().await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for JsonlOrderStore {
    async fn submit(&self, order: NewOrder) -> Result<OrderId, StorageError> {
        let mut state = self.state.lock().await;
        let id = self.allocator.next().await?;
        let stored = StoredOrder {
            id,
            agent_id: order.agent_id,
            shop_id: order.shop_id,
            placed_at: order.placed_at,
            evidence: order.evidence.clone(),
            status: OrderStatus::Pending.as_str().to_owned(),
            lines: order.lines().to_vec(),
        };
        // A failed append burns the id; the view stays untouched.
        self.append(&LogRecord::Submitted { order: stored.clone() }).await?;
        state.push(stored);
        Ok(id)
    }

    async fn list_by_agent(&self, agent_id: UserId) -> Result<Vec<OrderSummary>, StorageError> {
        let selected: Vec<StoredOrder> = {
            let state = self.state.lock().await;
            state
                .iter()
                .rev()
                .filter(|order| order.agent_id == agent_id)
                .take(LIST_RECENT_LIMIT)
                .cloned()
                .collect()
        };
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let areas = self.catalog.list_areas().await?;
        let products = self.catalog.list_products().await?;
        let mut shops: Vec<Shop> = Vec::new();
        for area in &areas {
            shops.extend(self.catalog.list_shops(area.id).await?);
        }

        Ok(selected
            .into_iter()
            .map(|order| {
                let shop = shops.iter().find(|shop| shop.id == order.shop_id);
                let area_name = shop
                    .and_then(|shop| areas.iter().find(|area| area.id == shop.area_id))
                    .map(|area| area.name.clone())
                    .unwrap_or_default();
                OrderSummary {
                    id: order.id,
                    placed_at: order.placed_at,
                    status: OrderStatus::from_label(&order.status),
                    shop_name: shop.map(|shop| shop.name.clone()).unwrap_or_default(),
                    area_name,
                    items: order
                        .lines
                        .iter()
                        .map(|line| SummaryItem {
                            product_name: products
                                .iter()
                                .find(|product| product.id == line.product_id)
                                .map(|product| product.name.clone())
                                .unwrap_or_else(|| format!("product {}", line.product_id.0)),
                            quantity: line.quantity,
                        })
                        .collect(),
                }
            })
            .collect())
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        if !state.iter().any(|order| order.id == id) {
            return Ok(false);
        }
        self.append(&LogRecord::StatusChanged {
            id,
            status: status.as_str().to_owned(),
            at: Utc::now(),
        })
        .await?;
        if let Some(order) = state.iter_mut().find(|order| order.id == id) {
            order.status = status.as_str().to_owned();
        }
        Ok(true)
    }

    async fn delete(&self, id: OrderId) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        if !state.iter().any(|order| order.id == id) {
            return Ok(false);
        }
        self.append(&LogRecord::Deleted { id, at: Utc::now() }).await?;
        state.retain(|order| order.id != id);
        Ok(true)
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    areas: Vec<Area>,
    #[serde(default)]
    shops: Vec<Shop>,
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    agents: Vec<Agent>,
}

/// Reference data for the file backend, loaded once from `catalog.json`.
/// Serves both the catalog and the identity directory.
pub struct JsonCatalog {
    areas: Vec<Area>,
    shops: Vec<Shop>,
    products: Vec<Product>,
    agents: Vec<Agent>,
}

impl JsonCatalog {
    pub async fn load(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(CATALOG_FILE);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::Unavailable(format!("catalog file `{}` not found", path.display()))
            } else {
                io_err(err)
            }
        })?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .map_err(|err| StorageError::Corrupt(format!("catalog file: {err}")))?;
        Ok(Self {
            areas: file.areas,
            shops: file.shops,
            products: file.products,
            agents: file.agents,
        })
    }
}

#[async_trait]
impl CatalogReader for JsonCatalog {
    async fn list_areas(&self) -> Result<Vec<Area>, StorageError> {
        let mut areas = self.areas.clone();
        areas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(areas)
    }

    async fn list_shops(&self, area_id: AreaId) -> Result<Vec<Shop>, StorageError> {
        let mut shops: Vec<Shop> =
            self.shops.iter().filter(|shop| shop.area_id == area_id).cloned().collect();
        shops.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shops)
    }

    async fn list_products(&self) -> Result<Vec<Product>, StorageError> {
        let mut products = self.products.clone();
        products.sort_by(|a, b| a.brand.cmp(&b.brand).then_with(|| a.name.cmp(&b.name)));
        Ok(products)
    }
}

#[async_trait]
impl IdentityDirectory for JsonCatalog {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<Agent>, StorageError> {
        Ok(self.agents.iter().find(|agent| agent.handle == handle).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use chrono::Utc;

    use orderkato_core::domain::{
        NewOrder, OrderId, OrderStatus, ProductId, ShopId, UserId,
    };
    use orderkato_core::storage::{
        CatalogReader, IdentityDirectory, OrderIdAllocator, OrderStore,
    };

    use super::{FileIdAllocator, JsonCatalog, JsonlOrderStore};

    const CATALOG_JSON: &str = r#"{
        "areas": [{ "id": 1, "name": "North" }],
        "shops": [{ "id": 10, "name": "Shop A", "address": null, "area_id": 1 }],
        "products": [
            { "id": 100, "name": "Widget", "unit_price": "10.00", "discount_pct": "0", "brand": "Acme" },
            { "id": 101, "name": "Gadget", "unit_price": "25.00", "discount_pct": "10", "brand": "Acme" }
        ],
        "agents": [{ "id": 7, "name": "Nika", "handle": "nika" }]
    }"#;

    async fn open_store(dir: &Path) -> JsonlOrderStore {
        tokio::fs::create_dir_all(dir).await.expect("data dir");
        tokio::fs::write(dir.join("catalog.json"), CATALOG_JSON).await.expect("catalog file");
        let catalog = Arc::new(JsonCatalog::load(dir).await.expect("load catalog"));
        JsonlOrderStore::open(dir, catalog).await.expect("open store")
    }

    fn order(lines: &[(i64, u32)]) -> NewOrder {
        NewOrder::new(
            UserId(7),
            ShopId(10),
            Utc::now(),
            None,
            lines.iter().map(|(id, quantity)| (ProductId(*id), *quantity)),
        )
        .expect("valid order")
    }

    #[tokio::test]
    async fn log_fold_reflects_submissions_updates_and_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path()).await;

        let first = store.submit(order(&[(100, 5), (101, 2)])).await.expect("first");
        let second = store.submit(order(&[(100, 1)])).await.expect("second");
        assert!(second.0 > first.0);

        assert!(store.update_status(first, OrderStatus::Delivered).await.expect("update"));
        assert!(store.delete(second).await.expect("delete"));

        let summaries = store.list_by_agent(UserId(7)).await.expect("list");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, first);
        assert_eq!(summaries[0].status, OrderStatus::Delivered);
        assert_eq!(summaries[0].shop_name, "Shop A");
        assert_eq!(summaries[0].items.len(), 2);
    }

    #[tokio::test]
    async fn restart_replays_the_log_and_continues_the_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");

        let first_id;
        {
            let store = open_store(dir.path()).await;
            first_id = store.submit(order(&[(100, 3)])).await.expect("submit");
            store.update_status(first_id, OrderStatus::Cancelled).await.expect("update");
        }

        // A fresh store over the same directory sees the folded state and
        // keeps allocating past the highest persisted id.
        let store = open_store(dir.path()).await;
        let summaries = store.list_by_agent(UserId(7)).await.expect("list");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, OrderStatus::Cancelled);

        let next = store.submit(order(&[(101, 1)])).await.expect("next submit");
        assert!(next.0 > first_id.0);
    }

    #[tokio::test]
    async fn counter_survives_restart_even_without_orders() {
        let dir = tempfile::tempdir().expect("tempdir");

        {
            let allocator = FileIdAllocator::open(dir.path()).await.expect("open");
            assert_eq!(allocator.next().await.expect("first"), OrderId(1));
            assert_eq!(allocator.next().await.expect("second"), OrderId(2));
        }

        let allocator = FileIdAllocator::open(dir.path()).await.expect("reopen");
        assert_eq!(allocator.next().await.expect("third"), OrderId(3));
    }

    #[tokio::test]
    async fn concurrent_allocations_stay_distinct_and_the_counter_is_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let allocator = Arc::new(FileIdAllocator::open(dir.path()).await.expect("open"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move { allocator.next().await.expect("next") }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join").0);
        }

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8, "no id may be handed out twice");

        // The counter on disk must account for every allocation, so a crash
        // right after the last call still never reissues an id.
        let persisted = tokio::fs::read_to_string(dir.path().join("order_seq"))
            .await
            .expect("counter file");
        assert_eq!(persisted.trim(), "8");
    }

    #[tokio::test]
    async fn missing_orders_report_false_without_touching_the_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path()).await;

        assert!(!store.update_status(OrderId(42), OrderStatus::Delivered).await.expect("update"));
        assert!(!store.delete(OrderId(42)).await.expect("delete"));
        assert!(
            !dir.path().join("orders.jsonl").exists(),
            "no-op operations must not create log records"
        );
    }

    #[tokio::test]
    async fn json_catalog_serves_reference_data_and_identities() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("catalog.json"), CATALOG_JSON)
            .await
            .expect("catalog file");
        let catalog = JsonCatalog::load(dir.path()).await.expect("load");

        assert_eq!(catalog.list_areas().await.expect("areas").len(), 1);
        assert_eq!(
            catalog
                .list_products()
                .await
                .expect("products")
                .iter()
                .map(|product| product.name.as_str())
                .collect::<Vec<_>>(),
            vec!["Gadget", "Widget"],
        );
        assert!(catalog.find_by_handle("nika").await.expect("lookup").is_some());
        assert!(catalog.find_by_handle("stranger").await.expect("lookup").is_none());
    }
}
