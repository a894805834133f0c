//! 对外的 Locker / Lock
//!
//! 只有两种后端，用封闭的枚举而不是 trait object 表达。

use std::fmt;
use std::sync::Arc;

use sqlx::{MySqlPool, PgPool};

use crate::context::LockContext;
use crate::error::Result;
use crate::lock::ReleaseOutcome;
use crate::logger::Logger;
use crate::mysql::{MySqlLock, MySqlLocker};
use crate::postgres::{PostgresLock, PostgresLocker};

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    MySql,
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 命名锁获取器
#[derive(Debug, Clone)]
pub enum Locker {
    MySql(MySqlLocker),
    Postgres(PostgresLocker),
}

impl Locker {
    pub fn mysql(pool: MySqlPool) -> Self {
        Self::MySql(MySqlLocker::new(pool))
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::Postgres(PostgresLocker::new(pool))
    }

    pub fn with_logger(self, logger: Arc<dyn Logger>) -> Self {
        match self {
            Self::MySql(locker) => Self::MySql(locker.with_logger(logger)),
            Self::Postgres(locker) => Self::Postgres(locker.with_logger(logger)),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::MySql(_) => Backend::MySql,
            Self::Postgres(_) => Backend::Postgres,
        }
    }

    /// 获取名为 `key` 的锁
    ///
    /// 其他会话已持有同名锁时阻塞，直到对方释放或 `ctx` 结束。
    /// 成功后返回的 `Lock` 独占一条连接，直到调用 `release`。
    pub async fn get(&self, ctx: &LockContext, key: &str) -> Result<Lock> {
        match self {
            Self::MySql(locker) => locker.get(ctx, key).await.map(Lock::MySql),
            Self::Postgres(locker) => locker.get(ctx, key).await.map(Lock::Postgres),
        }
    }
}

impl From<MySqlLocker> for Locker {
    fn from(locker: MySqlLocker) -> Self {
        Self::MySql(locker)
    }
}

impl From<PostgresLocker> for Locker {
    fn from(locker: PostgresLocker) -> Self {
        Self::Postgres(locker)
    }
}

/// 已获取的命名锁
#[derive(Debug)]
pub enum Lock {
    MySql(MySqlLock),
    Postgres(PostgresLock),
}

impl Lock {
    /// 释放锁，可重复、并发调用，只有第一次生效
    pub async fn release(&self) -> ReleaseOutcome {
        match self {
            Self::MySql(lock) => lock.release().await,
            Self::Postgres(lock) => lock.release().await,
        }
    }

    pub fn is_released(&self) -> bool {
        match self {
            Self::MySql(lock) => lock.is_released(),
            Self::Postgres(lock) => lock.is_released(),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::MySql(_) => Backend::MySql,
            Self::Postgres(_) => Backend::Postgres,
        }
    }
}
