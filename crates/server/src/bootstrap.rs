use std::sync::Arc;

use axum::Router;
use optiquote_core::clock::SystemClock;
use optiquote_core::config::{AppConfig, ConfigError, LoadOptions};
use optiquote_core::notify::NotificationError;
use optiquote_db::{connect_with_config, migrations, DbPool, SqlQuoteRepository};
use thiserror::Error;
use tracing::info;

use crate::audit_sink::TracingAuditSink;
use crate::lifecycle::QuoteLifecycleService;
use crate::notifications::dispatcher_from_config;
use crate::sweeper::ExpirationSweeper;
use crate::{health, routes};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: QuoteLifecycleService,
    /// Present only when `sweeper.enabled` is set.
    pub sweeper: Option<ExpirationSweeper>,
}

impl Application {
    pub fn router(&self) -> Router {
        routes::router(self.service.clone()).merge(health::router(
            self.db_pool.clone(),
            self.sweeper.is_some(),
            self.config.notifications.enabled,
        ))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification dispatcher setup failed: {0}")]
    Notification(#[source] NotificationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        "database migrations applied"
    );

    let service = QuoteLifecycleService::from_config(
        Arc::new(SqlQuoteRepository::new(db_pool.clone())),
        Arc::new(SystemClock),
        Arc::new(TracingAuditSink),
        &config,
    );

    let sweeper = if config.sweeper.enabled {
        let notifier =
            dispatcher_from_config(&config.notifications).map_err(BootstrapError::Notification)?;
        Some(ExpirationSweeper::new(service.clone(), notifier, config.sweeper.max_concurrency))
    } else {
        None
    };

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        sweeper_enabled = sweeper.is_some(),
        notifications_enabled = config.notifications.enabled,
        "lifecycle service ready"
    );

    Ok(Application { config, db_pool, service, sweeper })
}
