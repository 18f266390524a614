use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use chainpolicy_core::domain::intent::{Currency, IntentId, IntentRecord};
use chainpolicy_core::domain::policy::{PolicyRecord, PolicyRecordId};
use chainpolicy_core::translator::RateTable;

pub mod intent;
pub mod memory;
pub mod policy_record;
pub mod rates;

pub use intent::SqlIntentRepository;
pub use memory::{
    InMemoryConversionRateRepository, InMemoryIntentRepository, InMemoryPolicyRecordRepository,
};
pub use policy_record::SqlPolicyRecordRepository;
pub use rates::{ConversionRate, SqlConversionRateRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0} not found")]
    NotFound(String),
}

#[async_trait]
pub trait IntentRepository: Send + Sync {
    async fn find_by_id(&self, id: &IntentId) -> Result<Option<IntentRecord>, RepositoryError>;
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<IntentRecord>, RepositoryError>;
    async fn save(&self, intent: IntentRecord) -> Result<(), RepositoryError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: &IntentId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PolicyRecordRepository: Send + Sync {
    /// Records of one intent, oldest first with ties broken by id.
    async fn list_for_intent(
        &self,
        intent_id: &IntentId,
    ) -> Result<Vec<PolicyRecord>, RepositoryError>;
    async fn save(&self, record: PolicyRecord) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &PolicyRecordId) -> Result<(), RepositoryError>;
    async fn delete_for_intent(&self, intent_id: &IntentId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ConversionRateRepository: Send + Sync {
    async fn find_rate(&self, currency: Currency) -> Result<Option<Decimal>, RepositoryError>;
    async fn save_rate(&self, rate: ConversionRate) -> Result<(), RepositoryError>;
    async fn list_rates(&self) -> Result<Vec<ConversionRate>, RepositoryError>;
}

/// Snapshot of every stored rate for use by the translator.
pub async fn load_rate_table(
    repository: &dyn ConversionRateRepository,
) -> Result<RateTable, RepositoryError> {
    let rates = repository.list_rates().await?;
    Ok(rates.into_iter().map(|rate| (rate.currency, rate.rate)).collect())
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
