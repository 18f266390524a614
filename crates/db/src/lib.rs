pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    load_rate_table, ConversionRate, ConversionRateRepository, InMemoryConversionRateRepository,
    InMemoryIntentRepository, InMemoryPolicyRecordRepository, IntentRepository,
    PolicyRecordRepository, RepositoryError, SqlConversionRateRepository, SqlIntentRepository,
    SqlPolicyRecordRepository,
};
