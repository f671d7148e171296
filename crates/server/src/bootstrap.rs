use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use countersign_core::config::{AppConfig, ConfigError, LoadOptions};
use countersign_core::engine::WorkflowEngine;
use countersign_db::{connect_with_settings, migrations, DbPool, SqlRuleStore, SqlWorkflowStore};

use crate::api::{ApiState, Engine};
use crate::notify::ServerNotifier;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<Engine>,
    pub api_state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let notifier = ServerNotifier::from_config(&config.notify);
    info!(
        event_name = "system.bootstrap.notifier_selected",
        correlation_id = "bootstrap",
        transport = if notifier.is_noop() { "noop" } else { "webhook" },
        "notification transport initialized"
    );

    let engine = Arc::new(WorkflowEngine::new(
        SqlWorkflowStore::new(db_pool.clone()),
        SqlRuleStore::new(db_pool.clone()),
        notifier,
    ));
    let api_state = ApiState {
        engine: engine.clone(),
        workflows: Arc::new(SqlWorkflowStore::new(db_pool.clone())),
        rules: Arc::new(SqlRuleStore::new(db_pool.clone())),
    };

    Ok(Application { config, db_pool, engine, api_state })
}
