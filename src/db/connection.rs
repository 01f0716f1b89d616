//! Database connection and schema bootstrap.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::log::LevelFilter;

/// Create a new database connection with configured pool settings.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(5)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt).await
}

/// Create the local tables if this is a fresh machine.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute_unprepared(
        "CREATE TABLE IF NOT EXISTS planogram (
            slot_number INTEGER PRIMARY KEY,
            vending_machine_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_price REAL NOT NULL,
            quantity INTEGER NOT NULL,
            status TEXT NOT NULL
        )",
    )
    .await?;
    db.execute_unprepared(
        "CREATE TABLE IF NOT EXISTS sales_log (
            id TEXT PRIMARY KEY,
            vending_machine_id TEXT NOT NULL,
            slot_number INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            sold_at TEXT NOT NULL,
            unit_price REAL NOT NULL,
            status TEXT NOT NULL,
            sync INTEGER NOT NULL DEFAULT 0
        )",
    )
    .await?;
    db.execute_unprepared(
        "CREATE TABLE IF NOT EXISTS transaction_log (
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL,
            vending_machine_id TEXT NOT NULL,
            product TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            recorded_at TEXT NOT NULL,
            sync INTEGER NOT NULL DEFAULT 0
        )",
    )
    .await?;
    Ok(())
}

/// Test database connection.
pub async fn test_connection(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.ping().await
}
