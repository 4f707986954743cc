//! Migration runner, grounded on the teacher's `database::migrations`
//! schema-version-table pattern.

use sqlx::{Row, SqlitePool};

use crate::db::schema::{CREATE_INDEXES, CREATE_TABLES, SCHEMA_VERSION};
use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await?;

    let current: Option<i32> = sqlx::query("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(pool)
        .await?
        .map(|row| row.get::<i32, _>("version"));

    if current.unwrap_or(0) >= SCHEMA_VERSION {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for statement in CREATE_TABLES {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    for statement in CREATE_INDEXES {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query("DELETE FROM schema_version").execute(&mut *tx).await?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
