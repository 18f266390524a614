use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::Row;

use chainpolicy_core::domain::intent::Currency;

use super::{decode_err, parse_timestamp, timestamp, ConversionRateRepository, RepositoryError};
use crate::DbPool;

/// Multiplier that turns one unit of `currency` into the canonical currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversionRate {
    pub currency: Currency,
    pub rate: Decimal,
    pub updated_at: DateTime<Utc>,
}

pub struct SqlConversionRateRepository {
    pool: DbPool,
}

impl SqlConversionRateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_rate(row: &sqlx::sqlite::SqliteRow) -> Result<ConversionRate, RepositoryError> {
    let currency: String = row.try_get("currency").map_err(decode_err)?;
    let rate: String = row.try_get("rate").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(ConversionRate {
        currency: Currency::parse(&currency).ok_or_else(|| {
            RepositoryError::Decode(format!("currency: unknown value '{currency}'"))
        })?,
        rate: Decimal::from_str(&rate)
            .map_err(|error| RepositoryError::Decode(format!("rate: {error}")))?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ConversionRateRepository for SqlConversionRateRepository {
    async fn find_rate(&self, currency: Currency) -> Result<Option<Decimal>, RepositoryError> {
        let row = sqlx::query("SELECT currency, rate, updated_at FROM conversion_rate WHERE currency = ?")
            .bind(currency.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_rate).transpose()?.map(|rate| rate.rate))
    }

    async fn save_rate(&self, rate: ConversionRate) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversion_rate (currency, rate, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(currency) DO UPDATE SET
                 rate = excluded.rate,
                 updated_at = excluded.updated_at",
        )
        .bind(rate.currency.as_str())
        .bind(rate.rate.to_string())
        .bind(timestamp(&rate.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_rates(&self) -> Result<Vec<ConversionRate>, RepositoryError> {
        let rows =
            sqlx::query("SELECT currency, rate, updated_at FROM conversion_rate ORDER BY currency")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_rate).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use chainpolicy_core::domain::intent::Currency;
    use chainpolicy_core::translator::RateLookup;

    use super::{ConversionRate, SqlConversionRateRepository};
    use crate::repositories::{load_rate_table, ConversionRateRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlConversionRateRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversionRateRepository::new(pool)
    }

    #[tokio::test]
    async fn save_rate_upserts_by_currency() {
        let repo = setup().await;
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).single().expect("timestamp");

        repo.save_rate(ConversionRate {
            currency: Currency::Chf,
            rate: Decimal::new(109, 2),
            updated_at: now,
        })
        .await
        .expect("save");
        repo.save_rate(ConversionRate {
            currency: Currency::Chf,
            rate: Decimal::new(112, 2),
            updated_at: now + Duration::hours(1),
        })
        .await
        .expect("update");

        assert_eq!(repo.find_rate(Currency::Chf).await.expect("find"), Some(Decimal::new(112, 2)));
        assert_eq!(repo.find_rate(Currency::Eur).await.expect("find"), None);
        assert_eq!(repo.list_rates().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn loaded_rate_table_converts_known_currencies() {
        let repo = setup().await;
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).single().expect("timestamp");
        for (currency, rate) in [(Currency::Chf, Decimal::new(109, 2)), (Currency::Eur, Decimal::new(118, 2))] {
            repo.save_rate(ConversionRate { currency, rate, updated_at: now })
                .await
                .expect("save");
        }

        let table = load_rate_table(&repo).await.expect("load");

        assert_eq!(table.rate_for(Currency::Eur).expect("eur"), Decimal::new(118, 2));
        assert_eq!(table.rate_for(Currency::Usd).expect("usd"), Decimal::ONE);
    }
}
