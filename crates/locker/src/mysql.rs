//! MySQL 实现：`GET_LOCK` / `RELEASE_LOCK`
//!
//! 锁名直接作为 `GET_LOCK` 的参数，MySQL 限制其长度不超过 64 个字符。
//! 超时参数固定为 -1（无限等待），等待的中断由 `LockContext` 负责。

use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::mysql::MySql;
use sqlx::pool::PoolConnection;
use std::sync::Arc;

use crate::context::LockContext;
use crate::error::{LockError, Result};
use crate::lock::SessionLock;
use crate::logger::{Logger, logf};
use crate::session::{AdvisorySession, SessionLocker, SessionPool};

/// `GET_LOCK` 锁名的最大字符数
pub const MAX_KEY_CHARS: usize = 64;

/// MySQL 锁句柄
pub type MySqlLock = SessionLock<MySqlSession>;

/// 基于 `GET_LOCK` 的 locker
#[derive(Debug, Clone)]
pub struct MySqlLocker {
    inner: SessionLocker<MySqlPool>,
}

impl MySqlLocker {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            inner: SessionLocker::new(pool),
        }
    }

    pub fn with_logger(self, logger: Arc<dyn Logger>) -> Self {
        Self {
            inner: self.inner.with_logger(logger),
        }
    }

    /// 调用 `GET_LOCK(key, -1)` 获取锁
    ///
    /// 同名锁已被其他会话持有时阻塞，直到对方释放或 `ctx` 结束。
    pub async fn get(&self, ctx: &LockContext, key: &str) -> Result<MySqlLock> {
        validate_key(key)?;
        self.inner.acquire(ctx, key.to_string()).await
    }
}

/// 检查锁名是否满足 `GET_LOCK` 的约束
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LockError::invalid_key(key, "锁名不能为空"));
    }
    let chars = key.chars().count();
    if chars > MAX_KEY_CHARS {
        return Err(LockError::invalid_key(
            key,
            format!("长度 {chars} 超过 GET_LOCK 上限 {MAX_KEY_CHARS} 个字符"),
        ));
    }
    Ok(())
}

/// 租用中的 MySQL 连接
pub struct MySqlSession {
    conn: PoolConnection<MySql>,
    connection_id: i64,
}

#[async_trait]
impl AdvisorySession for MySqlSession {
    type Key = String;

    fn backend_id(&self) -> i64 {
        self.connection_id
    }

    async fn lock(&mut self, key: &Self::Key) -> Result<()> {
        let result: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, -1)")
            .bind(key.as_str())
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|source| LockError::Backend {
                op: "GET_LOCK",
                source,
            })?;
        check_get_lock(result)
    }

    async fn unlock(&mut self, key: &Self::Key) -> Result<bool> {
        let result: Option<i64> = sqlx::query_scalar("SELECT RELEASE_LOCK(?)")
            .bind(key.as_str())
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|source| LockError::Backend {
                op: "RELEASE_LOCK",
                source,
            })?;
        check_release_lock(result)
    }

    async fn close(self) -> std::result::Result<(), sqlx::Error> {
        self.conn.close().await
    }

    fn discard(self) {
        drop(self.conn.detach());
    }
}

#[async_trait]
impl SessionPool for MySqlPool {
    type Session = MySqlSession;

    const BACKEND: &'static str = "mysql";

    async fn lease(&self, logger: &dyn Logger) -> std::result::Result<MySqlSession, sqlx::Error> {
        let mut conn = self.acquire().await?;
        // 会话可能带着锁或执行中的 GET_LOCK，不能被放回池中复用
        conn.close_on_drop();
        let connection_id = sqlx::query_scalar("SELECT CAST(CONNECTION_ID() AS SIGNED)")
            .fetch_one(&mut *conn)
            .await;
        match connection_id {
            Ok(connection_id) => Ok(MySqlSession {
                conn,
                connection_id,
            }),
            Err(err) => {
                if let Err(close_err) = conn.close().await {
                    logf!(logger, "{}: 关闭连接时发生错误: {close_err}", Self::BACKEND);
                }
                Err(err)
            }
        }
    }

    async fn abort(&self, backend_id: i64) -> std::result::Result<(), sqlx::Error> {
        let sql = format!("KILL QUERY {backend_id}");
        sqlx::raw_sql(&sql).execute(self).await?;
        Ok(())
    }
}

/// `GET_LOCK` 只有返回 1 才表示成功
///
/// 0 表示超时（-1 等待下不应出现），NULL 表示出错（例如查询被 KILL）。
fn check_get_lock(result: Option<i64>) -> Result<()> {
    match result {
        Some(1) => Ok(()),
        Some(other) => Err(LockError::protocol("GET_LOCK", format!("返回 {other}"))),
        None => Err(LockError::protocol("GET_LOCK", "返回 NULL")),
    }
}

/// `RELEASE_LOCK`：1 已释放；0 锁由其他会话持有；NULL 锁不存在
fn check_release_lock(result: Option<i64>) -> Result<bool> {
    match result {
        Some(1) => Ok(true),
        Some(0) | None => Ok(false),
        Some(other) => Err(LockError::protocol("RELEASE_LOCK", format!("返回 {other}"))),
    }
}
