use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use orderkato_core::config::{AppConfig, ConfigError, LoadOptions, StorageBackend};
use orderkato_core::evidence::FsEvidenceStore;
use orderkato_core::storage::{CatalogReader, IdentityDirectory, OrderStore, StorageError};
use orderkato_core::verify::FreshnessVerifier;
use orderkato_core::workflow::OrderWorkflow;
use orderkato_db::{
    connect_from_config, migrations, JsonCatalog, JsonlOrderStore, SqlCatalogReader,
    SqlIdentityDirectory, SqlOrderStore,
};
use orderkato_telegram::BotApi;

pub struct Application {
    pub config: AppConfig,
    pub workflow: Arc<OrderWorkflow>,
    pub api: Arc<BotApi>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("file backend initialization failed: {0}")]
    FileBackend(#[source] StorageError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires the storage backend named by the config behind the shared traits,
/// then assembles the workflow and the Bot API client around it.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "bootstrap.start", backend = ?config.storage.backend, "starting bootstrap");

    let (catalog, identities, orders): (
        Arc<dyn CatalogReader>,
        Arc<dyn IdentityDirectory>,
        Arc<dyn OrderStore>,
    ) = match config.storage.backend {
        StorageBackend::Sqlite => {
            let pool = connect_from_config(&config.storage)
                .await
                .map_err(BootstrapError::DatabaseConnect)?;
            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(event_name = "bootstrap.database_ready", "database connected and migrated");
            (
                Arc::new(SqlCatalogReader::new(pool.clone())),
                Arc::new(SqlIdentityDirectory::new(pool.clone())),
                Arc::new(SqlOrderStore::new(pool)),
            )
        }
        StorageBackend::Jsonl => {
            let dir = &config.storage.jsonl_dir;
            let catalog = Arc::new(
                JsonCatalog::load(dir).await.map_err(BootstrapError::FileBackend)?,
            );
            let orders = JsonlOrderStore::open(dir, catalog.clone())
                .await
                .map_err(BootstrapError::FileBackend)?;
            info!(
                event_name = "bootstrap.file_backend_ready",
                dir = %dir.display(),
                "append-only order log opened"
            );
            (catalog.clone(), catalog, Arc::new(orders))
        }
    };

    let workflow = Arc::new(OrderWorkflow::new(
        catalog,
        identities,
        orders,
        Arc::new(FsEvidenceStore::new(&config.storage.evidence_dir)),
        FreshnessVerifier::new(config.verification.max_photo_age_secs),
        config.verification.photo_gate,
    ));
    let api = Arc::new(BotApi::new(&config.telegram));

    Ok(Application { config, workflow, api })
}
