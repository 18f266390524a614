use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

pub async fn undo_all(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.undo(pool, 0).await
}
