use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use orderkato_core::domain::{Area, AreaId, Product, ProductId, Shop, ShopId};
use orderkato_core::storage::{CatalogReader, StorageError};

use super::map_db_error;
use crate::DbPool;

pub struct SqlCatalogReader {
    pool: DbPool,
}

impl SqlCatalogReader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogReader for SqlCatalogReader {
    async fn list_areas(&self) -> Result<Vec<Area>, StorageError> {
        let rows = sqlx::query("SELECT id, name FROM areas ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.into_iter().map(area_from_row).collect()
    }

    async fn list_shops(&self, area_id: AreaId) -> Result<Vec<Shop>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, name, address, area_id FROM shops WHERE area_id = ? ORDER BY name",
        )
        .bind(area_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(shop_from_row).collect()
    }

    async fn list_products(&self) -> Result<Vec<Product>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, name, unit_price, discount_pct, brand FROM products ORDER BY brand, name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(product_from_row).collect()
    }
}

fn area_from_row(row: SqliteRow) -> Result<Area, StorageError> {
    Ok(Area {
        id: AreaId(row.try_get("id").map_err(map_db_error)?),
        name: row.try_get("name").map_err(map_db_error)?,
    })
}

fn shop_from_row(row: SqliteRow) -> Result<Shop, StorageError> {
    Ok(Shop {
        id: ShopId(row.try_get("id").map_err(map_db_error)?),
        name: row.try_get("name").map_err(map_db_error)?,
        address: row.try_get("address").map_err(map_db_error)?,
        area_id: AreaId(row.try_get("area_id").map_err(map_db_error)?),
    })
}

fn product_from_row(row: SqliteRow) -> Result<Product, StorageError> {
    Ok(Product {
        id: ProductId(row.try_get("id").map_err(map_db_error)?),
        name: row.try_get("name").map_err(map_db_error)?,
        unit_price: decimal_column(&row, "unit_price")?,
        discount_pct: decimal_column(&row, "discount_pct")?,
        brand: row.try_get("brand").map_err(map_db_error)?,
    })
}

/// Prices live in TEXT columns; anything unparseable is corrupt data, not a
/// driver failure.
fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(column).map_err(map_db_error)?;
    raw.trim()
        .parse::<Decimal>()
        .map_err(|_| StorageError::Corrupt(format!("invalid decimal in `{column}`: `{raw}`")))
}
