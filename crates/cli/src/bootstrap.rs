use chainpolicy_core::audit::AuditSink;
use chainpolicy_core::config::{AppConfig, ConfigError, LoadOptions};
use chainpolicy_core::reconcile::EnforcementClient;
use chainpolicy_db::repositories::{
    SqlConversionRateRepository, SqlIntentRepository, SqlPolicyRecordRepository,
};
use chainpolicy_db::{connect, migrations, DbPool};
use chainpolicy_pdp::{NoopEnforcementClient, PdpClient, PdpClientError};
use thiserror::Error;
use tracing::info;

use crate::service::IntentService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub intents: SqlIntentRepository,
    pub records: SqlPolicyRecordRepository,
    pub rates: SqlConversionRateRepository,
    pub enforcement: Box<dyn EnforcementClient>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Enforcement(#[from] PdpClientError),
}

impl BootstrapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_validation",
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::Enforcement(_) => "pdp_client",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::DatabaseConnect(_) => 4,
            Self::Migration(_) => 5,
            Self::Enforcement(_) => 9,
        }
    }
}

pub fn enforcement_client(config: &AppConfig) -> Result<Box<dyn EnforcementClient>, PdpClientError> {
    if !config.pdp.enabled {
        return Ok(Box::new(NoopEnforcementClient));
    }
    Ok(Box::new(PdpClient::new(&config.pdp, config.timeframes)?))
}

/// Loads configuration, opens the database with migrations applied and picks
/// the enforcement client.
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "database connected and migrated"
    );

    let enforcement = enforcement_client(&config)?;
    info!(
        event_name = "system.bootstrap.enforcement_ready",
        correlation_id = "bootstrap",
        pdp_enabled = config.pdp.enabled,
        pdp_base_url = %config.pdp.base_url,
        "enforcement client initialized"
    );

    Ok(Application {
        intents: SqlIntentRepository::new(db_pool.clone()),
        records: SqlPolicyRecordRepository::new(db_pool.clone()),
        rates: SqlConversionRateRepository::new(db_pool.clone()),
        config,
        db_pool,
        enforcement,
    })
}

impl Application {
    pub fn intent_service<'a>(
        &'a self,
        audit: &'a dyn AuditSink,
        correlation_id: &str,
    ) -> IntentService<'a> {
        IntentService::new(
            &self.intents,
            &self.records,
            &self.rates,
            self.enforcement.as_ref(),
            audit,
            self.config.selection.clone(),
        )
        .with_correlation_id(correlation_id)
    }

    pub async fn shutdown(self) {
        self.db_pool.close().await;
    }
}
