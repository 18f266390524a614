use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use chainpolicy_core::domain::intent::{Blockchain, Currency, IntentId};
use chainpolicy_core::domain::policy::{
    BlockchainType, CostProfile, ExternalPolicyId, Policy, PolicyInterval, PolicyRecord,
    PolicyRecordId, TimeMarker,
};

use super::{decode_err, parse_timestamp, timestamp, PolicyRecordRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, intent_id, external_id, username, cost_profile,
        timeframe_start, timeframe_end, cost_interval, currency, threshold, split_txs,
        blockchain_pool, blockchain_type, min_tx_rate, max_block_time, min_data_size,
        max_tx_cost, min_popularity, min_stability, turing_complete, encryption, redundancy,
        created_at, updated_at
     FROM policy_record";

pub struct SqlPolicyRecordRepository {
    pool: DbPool,
}

impl SqlPolicyRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_enum<T>(
    column: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(value).ok_or_else(|| RepositoryError::Decode(format!("{column}: unknown value '{value}'")))
}

fn decode_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

fn decode_count(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<u32, RepositoryError> {
    let value: i64 = row.try_get(column).map_err(decode_err)?;
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column}: {value} is out of range")))
}

fn decode_pool(value: &str) -> Result<BTreeSet<Blockchain>, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("blockchain_pool: {error}")))
}

fn encode_pool(pool: &BTreeSet<Blockchain>) -> Result<String, RepositoryError> {
    serde_json::to_string(pool)
        .map_err(|error| RepositoryError::Decode(format!("blockchain_pool: {error}")))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<PolicyRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let intent_id: String = row.try_get("intent_id").map_err(decode_err)?;
    let external_id: String = row.try_get("external_id").map_err(decode_err)?;
    let username: String = row.try_get("username").map_err(decode_err)?;
    let cost_profile: String = row.try_get("cost_profile").map_err(decode_err)?;
    let timeframe_start: String = row.try_get("timeframe_start").map_err(decode_err)?;
    let timeframe_end: String = row.try_get("timeframe_end").map_err(decode_err)?;
    let cost_interval: String = row.try_get("cost_interval").map_err(decode_err)?;
    let currency: String = row.try_get("currency").map_err(decode_err)?;
    let threshold: String = row.try_get("threshold").map_err(decode_err)?;
    let blockchain_pool: String = row.try_get("blockchain_pool").map_err(decode_err)?;
    let blockchain_type: String = row.try_get("blockchain_type").map_err(decode_err)?;
    let max_tx_cost: String = row.try_get("max_tx_cost").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    let policy = Policy {
        user: username,
        cost_profile: decode_enum("cost_profile", &cost_profile, CostProfile::parse)?,
        timeframe_start: decode_enum("timeframe_start", &timeframe_start, TimeMarker::parse)?,
        timeframe_end: decode_enum("timeframe_end", &timeframe_end, TimeMarker::parse)?,
        interval: decode_enum("cost_interval", &cost_interval, PolicyInterval::parse)?,
        currency: decode_enum("currency", &currency, Currency::parse)?,
        threshold: decode_decimal("threshold", &threshold)?,
        split_txs: row.try_get("split_txs").map_err(decode_err)?,
        blockchain_pool: decode_pool(&blockchain_pool)?,
        blockchain_type: decode_enum("blockchain_type", &blockchain_type, BlockchainType::parse)?,
        min_tx_rate: decode_count(row, "min_tx_rate")?,
        max_block_time: decode_count(row, "max_block_time")?,
        min_data_size: decode_count(row, "min_data_size")?,
        max_tx_cost: decode_decimal("max_tx_cost", &max_tx_cost)?,
        min_popularity: row.try_get("min_popularity").map_err(decode_err)?,
        min_stability: row.try_get("min_stability").map_err(decode_err)?,
        turing_complete: row.try_get("turing_complete").map_err(decode_err)?,
        encryption: row.try_get("encryption").map_err(decode_err)?,
        redundancy: row.try_get("redundancy").map_err(decode_err)?,
    };

    Ok(PolicyRecord {
        id: PolicyRecordId(id),
        intent_id: IntentId(intent_id),
        external_id: ExternalPolicyId(external_id),
        policy,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl PolicyRecordRepository for SqlPolicyRecordRepository {
    async fn list_for_intent(
        &self,
        intent_id: &IntentId,
    ) -> Result<Vec<PolicyRecord>, RepositoryError> {
        let query = format!("{SELECT_COLUMNS} WHERE intent_id = ? ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query(&query).bind(&intent_id.0).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn save(&self, record: PolicyRecord) -> Result<(), RepositoryError> {
        let policy = &record.policy;
        sqlx::query(
            "INSERT INTO policy_record (
                id, intent_id, external_id, username, cost_profile, timeframe_start,
                timeframe_end, cost_interval, currency, threshold, split_txs, blockchain_pool,
                blockchain_type, min_tx_rate, max_block_time, min_data_size, max_tx_cost,
                min_popularity, min_stability, turing_complete, encryption, redundancy,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                external_id = excluded.external_id,
                username = excluded.username,
                cost_profile = excluded.cost_profile,
                timeframe_start = excluded.timeframe_start,
                timeframe_end = excluded.timeframe_end,
                cost_interval = excluded.cost_interval,
                currency = excluded.currency,
                threshold = excluded.threshold,
                split_txs = excluded.split_txs,
                blockchain_pool = excluded.blockchain_pool,
                blockchain_type = excluded.blockchain_type,
                min_tx_rate = excluded.min_tx_rate,
                max_block_time = excluded.max_block_time,
                min_data_size = excluded.min_data_size,
                max_tx_cost = excluded.max_tx_cost,
                min_popularity = excluded.min_popularity,
                min_stability = excluded.min_stability,
                turing_complete = excluded.turing_complete,
                encryption = excluded.encryption,
                redundancy = excluded.redundancy,
                updated_at = excluded.updated_at",
        )
        .bind(&record.id.0)
        .bind(&record.intent_id.0)
        .bind(&record.external_id.0)
        .bind(&policy.user)
        .bind(policy.cost_profile.as_str())
        .bind(policy.timeframe_start.as_str())
        .bind(policy.timeframe_end.as_str())
        .bind(policy.interval.as_str())
        .bind(policy.currency.as_str())
        .bind(policy.threshold.to_string())
        .bind(policy.split_txs)
        .bind(encode_pool(&policy.blockchain_pool)?)
        .bind(policy.blockchain_type.as_str())
        .bind(i64::from(policy.min_tx_rate))
        .bind(i64::from(policy.max_block_time))
        .bind(i64::from(policy.min_data_size))
        .bind(policy.max_tx_cost.to_string())
        .bind(policy.min_popularity)
        .bind(policy.min_stability)
        .bind(policy.turing_complete)
        .bind(policy.encryption)
        .bind(policy.redundancy)
        .bind(timestamp(&record.created_at))
        .bind(timestamp(&record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &PolicyRecordId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM policy_record WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("policy record {id}")));
        }
        Ok(())
    }

    async fn delete_for_intent(&self, intent_id: &IntentId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM policy_record WHERE intent_id = ?")
            .bind(&intent_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
