use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use orderkato_core::domain::{
    NewOrder, OrderId, OrderStatus, OrderSummary, SummaryItem, UserId,
};
use orderkato_core::storage::{OrderStore, StorageError, LIST_RECENT_LIMIT};

use super::map_db_error;
use crate::DbPool;

/// Relational order store. The header's AUTOINCREMENT key is the durable
/// order identifier, so allocation and insertion happen in one transaction
/// and a rolled-back submit never leaks a visible id.
pub struct SqlOrderStore {
    pool: DbPool,
}

impl SqlOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqlOrderStore {
    async fn submit(&self, order: NewOrder) -> Result<OrderId, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let result = sqlx::query(
            "INSERT INTO orders (agent_id, shop_id, placed_at, evidence, status)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order.agent_id.0)
        .bind(order.shop_id.0)
        .bind(order.placed_at)
        .bind(order.evidence.as_ref().map(|evidence| evidence.0.clone()))
        .bind(OrderStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let id = OrderId(result.last_insert_rowid());

        for line in order.lines() {
            sqlx::query(
                "INSERT INTO order_lines (order_id, product_id, quantity) VALUES (?, ?, ?)",
            )
            .bind(id.0)
            .bind(line.product_id.0)
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(id)
    }

    async fn list_by_agent(&self, agent_id: UserId) -> Result<Vec<OrderSummary>, StorageError> {
        let headers = sqlx::query(
            "SELECT o.id, o.placed_at, o.status, s.name AS shop_name, a.name AS area_name
             FROM orders o
             JOIN shops s ON s.id = o.shop_id
             JOIN areas a ON a.id = s.area_id
             WHERE o.agent_id = ?
             ORDER BY o.placed_at DESC, o.id DESC
             LIMIT ?",
        )
        .bind(agent_id.0)
        .bind(LIST_RECENT_LIMIT as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        let mut summaries = Vec::with_capacity(headers.len());
        for header in headers {
            let id: i64 = header.try_get("id").map_err(map_db_error)?;
            let items = sqlx::query(
                "SELECT p.name AS product_name, l.quantity
                 FROM order_lines l
                 JOIN products p ON p.id = l.product_id
                 WHERE l.order_id = ?
                 ORDER BY p.name",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(|row| {
                Ok(SummaryItem {
                    product_name: row.try_get("product_name").map_err(map_db_error)?,
                    quantity: row.try_get::<i64, _>("quantity").map_err(map_db_error)? as u32,
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

            let status: String = header.try_get("status").map_err(map_db_error)?;
            summaries.push(OrderSummary {
                id: OrderId(id),
                placed_at: header.try_get::<DateTime<Utc>, _>("placed_at").map_err(map_db_error)?,
                status: OrderStatus::from_label(&status),
                shop_name: header.try_get("shop_name").map_err(map_db_error)?,
                area_name: header.try_get("area_name").map_err(map_db_error)?,
                items,
            });
        }

        Ok(summaries)
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: OrderId) -> Result<bool, StorageError> {
        // ON DELETE CASCADE removes the lines; AUTOINCREMENT keeps the id
        // from ever being reissued.
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::Row;

    use orderkato_core::domain::{NewOrder, OrderStatus, ProductId, ShopId, UserId};
    use orderkato_core::storage::OrderStore;

    use super::SqlOrderStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        sqlx::raw_sql(
            "INSERT INTO areas (id, name) VALUES (1, 'North');
             INSERT INTO shops (id, name, address, area_id) VALUES (10, 'Shop A', NULL, 1);
             INSERT INTO products (id, name, unit_price, discount_pct, brand) VALUES
                (100, 'Widget', '10.00', '0', 'Acme'),
                (101, 'Gadget', '25.00', '10', 'Acme');
             INSERT INTO agents (id, name, handle) VALUES (7, 'Nika', 'nika');",
        )
        .execute(&pool)
        .await
        .expect("seed");
        pool
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
    async fn submit_persists_header_and_lines_atomically() {
        let pool = seeded_pool().await;
        let store = SqlOrderStore::new(pool.clone());

        let id = store.submit(order(&[(100, 5), (101, 2)])).await.expect("submit");

        let line_count = sqlx::query("SELECT COUNT(*) AS count FROM order_lines WHERE order_id = ?")
            .bind(id.0)
            .fetch_one(&pool)
            .await
            .expect("count lines")
            .get::<i64, _>("count");
        assert_eq!(line_count, 2);

        let summaries = store.list_by_agent(UserId(7)).await.expect("list");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, id);
        assert_eq!(summaries[0].status, OrderStatus::Pending);
        assert_eq!(summaries[0].shop_name, "Shop A");
        assert_eq!(summaries[0].items.len(), 2);
    }

    #[tokio::test]
    async fn failed_submit_leaves_no_partial_rows() {
        let pool = seeded_pool().await;
        let store = SqlOrderStore::new(pool.clone());

        // Second line violates the product foreign key; the whole submit
        // must roll back, header included.
        store.submit(order(&[(100, 1), (999, 1)])).await.expect_err("fk violation");

        let order_count = sqlx::query("SELECT COUNT(*) AS count FROM orders")
            .fetch_one(&pool)
            .await
            .expect("count orders")
            .get::<i64, _>("count");
        assert_eq!(order_count, 0);
    }

    #[tokio::test]
    async fn ids_increase_and_survive_deletion() {
        let pool = seeded_pool().await;
        let store = SqlOrderStore::new(pool);

        let first = store.submit(order(&[(100, 1)])).await.expect("first");
        assert!(store.delete(first).await.expect("delete"));
        let second = store.submit(order(&[(100, 1)])).await.expect("second");

        assert!(second.0 > first.0, "deleted ids must never be reissued");
    }

    #[tokio::test]
    async fn status_updates_round_trip_open_labels() {
        let pool = seeded_pool().await;
        let store = SqlOrderStore::new(pool);

        let id = store.submit(order(&[(100, 1)])).await.expect("submit");
        assert!(store
            .update_status(id, OrderStatus::Other("Staged".to_owned()))
            .await
            .expect("update"));

        let summaries = store.list_by_agent(UserId(7)).await.expect("list");
        assert_eq!(summaries[0].status, OrderStatus::Other("Staged".to_owned()));
    }

    #[tokio::test]
    async fn missing_order_updates_report_false() {
        let pool = seeded_pool().await;
        let store = SqlOrderStore::new(pool);

        use orderkato_core::domain::OrderId;
        assert!(!store.update_status(OrderId(42), OrderStatus::Delivered).await.expect("update"));
        assert!(!store.delete(OrderId(42)).await.expect("delete"));
    }

    #[tokio::test]
    async fn listing_caps_at_the_recent_limit() {
        let pool = seeded_pool().await;
        let store = SqlOrderStore::new(pool);

        for _ in 0..25 {
            store.submit(order(&[(100, 1)])).await.expect("submit");
        }
        let summaries = store.list_by_agent(UserId(7)).await.expect("list");
        assert_eq!(summaries.len(), 20);
        // Newest first.
        assert!(summaries[0].id.0 > summaries[19].id.0);
    }
}
