use async_trait::async_trait;
use sqlx::Row;

use orderkato_core::domain::{Agent, UserId};
use orderkato_core::storage::{IdentityDirectory, StorageError};

use super::map_db_error;
use crate::DbPool;

/// Registered agents, keyed by messaging handle. Handles are stored
/// lowercase; callers normalize before lookup.
pub struct SqlIdentityDirectory {
    pool: DbPool,
}

impl SqlIdentityDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for SqlIdentityDirectory {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<Agent>, StorageError> {
        let row = sqlx::query("SELECT id, name, handle FROM agents WHERE handle = ?")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(|row| {
            Ok(Agent {
                id: UserId(row.try_get("id").map_err(map_db_error)?),
                name: row.try_get("name").map_err(map_db_error)?,
                handle: row.try_get("handle").map_err(map_db_error)?,
            })
        })
        .transpose()
    }
}
