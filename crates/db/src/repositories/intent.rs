use sqlx::Row;

use chainpolicy_core::domain::intent::{IntentId, IntentRecord};

use super::{decode_err, parse_timestamp, timestamp, IntentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIntentRepository {
    pool: DbPool,
}

impl SqlIntentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_intent(row: &sqlx::sqlite::SqliteRow) -> Result<IntentRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let owner: String = row.try_get("owner").map_err(decode_err)?;
    let text: String = row.try_get("text").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(IntentRecord {
        id: IntentId(id),
        owner,
        text,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl IntentRepository for SqlIntentRepository {
    async fn find_by_id(&self, id: &IntentId) -> Result<Option<IntentRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, owner, text, created_at, updated_at FROM intent WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_intent).transpose()
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<IntentRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner, text, created_at, updated_at
             FROM intent WHERE owner = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_intent).collect()
    }

    async fn save(&self, intent: IntentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO intent (id, owner, text, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 owner = excluded.owner,
                 text = excluded.text,
                 updated_at = excluded.updated_at",
        )
        .bind(&intent.id.0)
        .bind(&intent.owner)
        .bind(&intent.text)
        .bind(timestamp(&intent.created_at))
        .bind(timestamp(&intent.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &IntentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM intent WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
