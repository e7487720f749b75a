pub mod connection;
pub mod jsonl;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use jsonl::{FileIdAllocator, JsonCatalog, JsonlOrderStore};
pub use repositories::{SqlCatalogReader, SqlIdentityDirectory, SqlOrderStore};
