//! PostgreSQL 实现：`pg_advisory_lock(int4, int4)` / `pg_advisory_unlock(int4, int4)`
//!
//! 字符串锁名先经 `KeyEncoder` 映射为两个 32 位整数，已有稳定整数标识的
//! 调用方可以通过 `get_by_raw_key` 绕过哈希，直接与其他实现互通。

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::pool::PoolConnection;
use sqlx::postgres::Postgres;
use std::sync::Arc;

use crate::context::LockContext;
use crate::error::{LockError, Result};
use crate::key::{AdvisoryKey, KeyEncoder};
use crate::lock::SessionLock;
use crate::logger::{Logger, logf};
use crate::session::{AdvisorySession, SessionLocker, SessionPool};

/// PostgreSQL 锁句柄
pub type PostgresLock = SessionLock<PgSession>;

/// 基于 `pg_advisory_lock` 的 locker
///
/// 默认使用 FNV-1a 与 MurmurHash3 两种哈希计算锁标识，见 [`KeyEncoder`]。
#[derive(Debug, Clone)]
pub struct PostgresLocker {
    inner: SessionLocker<PgPool>,
    encoder: KeyEncoder,
}

impl PostgresLocker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            inner: SessionLocker::new(pool),
            encoder: KeyEncoder::default(),
        }
    }

    pub fn with_logger(self, logger: Arc<dyn Logger>) -> Self {
        Self {
            inner: self.inner.with_logger(logger),
            ..self
        }
    }

    /// 替换锁名哈希方案
    ///
    /// 所有需要互斥的进程必须使用相同的方案。
    pub fn with_encoder(self, encoder: KeyEncoder) -> Self {
        Self { encoder, ..self }
    }

    /// 按字符串锁名获取锁
    pub async fn get(&self, ctx: &LockContext, key: &str) -> Result<PostgresLock> {
        let key = self.encode(key)?;
        self.get_by_raw_key(ctx, key.a, key.b).await
    }

    /// 直接按整数对调用 `pg_advisory_lock(key_a, key_b)`
    pub async fn get_by_raw_key(
        &self,
        ctx: &LockContext,
        key_a: i32,
        key_b: i32,
    ) -> Result<PostgresLock> {
        self.inner
            .acquire(ctx, AdvisoryKey::new(key_a, key_b))
            .await
    }

    /// 锁名对应的原生标识
    pub fn encode(&self, key: &str) -> Result<AdvisoryKey> {
        if key.is_empty() {
            return Err(LockError::invalid_key(key, "锁名不能为空"));
        }
        self.encoder
            .encode(key)
            .map_err(|err| LockError::invalid_key(key, format!("计算哈希失败: {err}")))
    }
}

/// 租用中的 PostgreSQL 连接
pub struct PgSession {
    conn: PoolConnection<Postgres>,
    pid: i32,
}

#[async_trait]
impl AdvisorySession for PgSession {
    type Key = AdvisoryKey;

    fn backend_id(&self) -> i64 {
        i64::from(self.pid)
    }

    async fn lock(&mut self, key: &Self::Key) -> Result<()> {
        // 返回 void，没有错误即表示已获得锁
        sqlx::query("SELECT pg_advisory_lock($1, $2)")
            .bind(key.a)
            .bind(key.b)
            .execute(&mut *self.conn)
            .await
            .map_err(|source| LockError::Backend {
                op: "pg_advisory_lock",
                source,
            })?;
        Ok(())
    }

    async fn unlock(&mut self, key: &Self::Key) -> Result<bool> {
        sqlx::query_scalar("SELECT pg_advisory_unlock($1, $2)")
            .bind(key.a)
            .bind(key.b)
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|source| LockError::Backend {
                op: "pg_advisory_unlock",
                source,
            })
    }

    async fn close(self) -> std::result::Result<(), sqlx::Error> {
        self.conn.close().await
    }

    fn discard(self) {
        drop(self.conn.detach());
    }
}

#[async_trait]
impl SessionPool for PgPool {
    type Session = PgSession;

    const BACKEND: &'static str = "postgres";

    async fn lease(&self, logger: &dyn Logger) -> std::result::Result<PgSession, sqlx::Error> {
        let mut conn = self.acquire().await?;
        // 会话可能带着锁或执行中的 pg_advisory_lock，不能被放回池中复用
        conn.close_on_drop();
        let pid = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *conn)
            .await;
        match pid {
            Ok(pid) => Ok(PgSession { conn, pid }),
            Err(err) => {
                if let Err(close_err) = conn.close().await {
                    logf!(logger, "{}: 关闭连接时发生错误: {close_err}", Self::BACKEND);
                }
                Err(err)
            }
        }
    }

    async fn abort(&self, backend_id: i64) -> std::result::Result<(), sqlx::Error> {
        let pid = i32::try_from(backend_id)
            .map_err(|err| sqlx::Error::Protocol(format!("无效的 backend pid {backend_id}: {err}")))?;
        let _cancelled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
            .bind(pid)
            .fetch_one(self)
            .await?;
        Ok(())
    }
}
