use orderkato_core::storage::StorageError;

pub mod catalog;
pub mod identity;
pub mod order;

pub use catalog::SqlCatalogReader;
pub use identity::SqlIdentityDirectory;
pub use order::SqlOrderStore;

/// Collapses driver errors into the backend-neutral taxonomy. The driver
/// detail survives only in the message, which goes to the operator log.
pub(crate) fn map_db_error(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            StorageError::Corrupt(err.to_string())
        }
        other => StorageError::Io(other.to_string()),
    }
}
