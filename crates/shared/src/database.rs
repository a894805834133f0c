//! 数据库连接管理模块
//!
//! 按 [`DatabaseConfig`] 构建 MySQL / PostgreSQL 连接池。
//! 锁持有期间独占一条连接，`max_connections` 即可同时持有的锁数上限。

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// 创建 MySQL 连接池
#[instrument(skip(config))]
pub async fn connect_mysql(config: &DatabaseConfig) -> Result<MySqlPool> {
    if config.mysql_url.is_empty() {
        return Err(SharedError::MissingUrl { backend: "mysql" });
    }
    info!("Connecting to MySQL...");

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect(&config.mysql_url)
        .await?;

    info!("MySQL connection pool created");
    Ok(pool)
}

/// 创建 PostgreSQL 连接池
#[instrument(skip(config))]
pub async fn connect_postgres(config: &DatabaseConfig) -> Result<PgPool> {
    if config.postgres_url.is_empty() {
        return Err(SharedError::MissingUrl {
            backend: "postgres",
        });
    }
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect(&config.postgres_url)
        .await?;

    info!("PostgreSQL connection pool created");
    Ok(pool)
}

/// MySQL 健康检查
pub async fn mysql_health_check(pool: &MySqlPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(SharedError::from)
}

/// PostgreSQL 健康检查
pub async fn postgres_health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(SharedError::from)
}
