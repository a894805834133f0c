//! 基于数据库 advisory lock 的跨进程命名锁
//!
//! 互斥由数据库保证：MySQL 使用 `GET_LOCK`，PostgreSQL 使用 `pg_advisory_lock`。
//! 两者的锁都是会话级的，因此每把锁在持有期间独占一条从连接池租出的连接，
//! 释放时在同一条连接上解锁并关闭它。
//!
//! ```ignore
//! use db_locker::{LockContext, Locker};
//! use std::time::Duration;
//!
//! let locker = Locker::postgres(pool);
//! let ctx = LockContext::background().with_timeout(Duration::from_secs(5));
//! let lock = locker.get(&ctx, "orders/42").await?;
//! // 临界区...
//! lock.release().await;
//! ```

pub mod context;
pub mod error;
pub mod key;
pub mod lock;
pub mod locker;
pub mod logger;
pub mod mysql;
pub mod postgres;
pub mod session;
pub mod test_utils;

pub use context::{CancelHandle, ContextError, LockContext};
pub use error::{ErrorKind, LockError, Result};
pub use key::{AdvisoryKey, Fnv1a32, Hash32, KeyEncoder, Murmur3};
pub use lock::{ReleaseAnomaly, ReleaseOutcome, SessionLock};
pub use locker::{Backend, Lock, Locker};
pub use logger::{Logger, TracingLogger};
pub use mysql::{MySqlLock, MySqlLocker};
pub use postgres::{PostgresLock, PostgresLocker};
pub use session::{AdvisorySession, SessionLocker, SessionPool};
