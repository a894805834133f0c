//! 测试环境管理
//!
//! 统一管理测试所需的数据库连接。

use anyhow::{Context, Result};
use db_locker::{AdvisoryKey, Locker, MySqlLocker, PostgresLocker};
use locker_shared::config::DatabaseConfig;
use locker_shared::{database, test_utils};
use sqlx::{MySqlPool, PgPool};

/// 测试环境
#[derive(Debug, Clone)]
pub struct TestEnvironment {
    pub config: DatabaseConfig,
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            config: test_utils::test_database_config(),
        }
    }

    pub async fn mysql_pool(&self) -> Result<MySqlPool> {
        database::connect_mysql(&self.config)
            .await
            .context("连接 MySQL 失败")
    }

    pub async fn postgres_pool(&self) -> Result<PgPool> {
        database::connect_postgres(&self.config)
            .await
            .context("连接 PostgreSQL 失败")
    }

    pub async fn mysql_locker(&self) -> Result<Locker> {
        Ok(MySqlLocker::new(self.mysql_pool().await?).into())
    }

    pub async fn postgres_locker(&self) -> Result<Locker> {
        Ok(PostgresLocker::new(self.postgres_pool().await?).into())
    }
}

// ==================== 锁状态查询 ====================

/// MySQL 上是否无人持有名为 `key` 的锁
pub async fn mysql_lock_is_free(pool: &MySqlPool, key: &str) -> Result<bool> {
    let free: Option<i64> = sqlx::query_scalar("SELECT IS_FREE_LOCK(?)")
        .bind(key)
        .fetch_one(pool)
        .await?;
    Ok(free == Some(1))
}

/// PostgreSQL 上是否无人持有 `key`
///
/// 用独立连接尝试加锁，成功则立即解锁并关闭连接。
pub async fn postgres_lock_is_free(pool: &PgPool, key: AdvisoryKey) -> Result<bool> {
    let mut conn = pool.acquire().await?;
    let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, $2)")
        .bind(key.a)
        .bind(key.b)
        .fetch_one(&mut *conn)
        .await?;
    if acquired {
        sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1, $2)")
            .bind(key.a)
            .bind(key.b)
            .fetch_one(&mut *conn)
            .await?;
    }
    conn.close().await?;
    Ok(acquired)
}
