//! Pool construction and embedded migrations.

use anyhow::{Context, Result};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool};

/// Open (creating if missing) the sqlite database named by `db_url` and run
/// embedded migrations against it.
pub async fn connect(db_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        Sqlite::create_database(db_url)
            .await
            .context("failed to create sqlite database")?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(db_url)
        .await
        .context("failed to connect to sqlite database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    Ok(pool)
}
