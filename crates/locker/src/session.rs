//! 会话租用与获取锁流程
//!
//! 两种后端的 advisory lock 都是会话级的：锁只在发起它的那条连接存活期间有效。
//! 这里把连接池抽象为 `SessionPool`，把租出的连接抽象为 `AdvisorySession`，
//! `SessionLocker` 在其上实现与后端无关的获取流程：
//!
//! 1. 租用连接（可被上下文打断）
//! 2. 发起后端的阻塞获取调用（可被上下文打断）
//! 3. 失败时先关闭连接再返回错误
//!
//! 进程内不维护任何锁注册表，同名锁的排他性完全交给后端。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::context::{ContextError, LockContext};
use crate::error::{LockError, Result};
use crate::lock::SessionLock;
use crate::logger::{Logger, default_logger, logf};

/// 中止后端查询的最长等待时间
const ABORT_TIMEOUT: Duration = Duration::from_secs(5);

/// 一条被独占租用的数据库会话
#[async_trait]
pub trait AdvisorySession: Send + 'static {
    /// 后端原生的锁标识
    type Key: Clone + fmt::Debug + Send + Sync + 'static;

    /// 后端为该连接分配的 id，用于从其他连接中止它的查询
    fn backend_id(&self) -> i64;

    /// 阻塞直到获得锁；结果不符合后端约定时返回 `Protocol`
    async fn lock(&mut self, key: &Self::Key) -> Result<()>;

    /// 释放锁，`Ok(false)` 表示锁并未被本会话持有
    async fn unlock(&mut self, key: &Self::Key) -> Result<bool>;

    /// 关闭会话，不归还连接池
    async fn close(self) -> std::result::Result<(), sqlx::Error>;

    /// 同步断开会话，用于没有异步运行时可用的场合
    fn discard(self);
}

/// 会话来源
#[async_trait]
pub trait SessionPool: Clone + Send + Sync + 'static {
    type Session: AdvisorySession;

    /// 后端名称，用于日志和指标标签
    const BACKEND: &'static str;

    /// 租用一条独占会话
    ///
    /// 租出的会话在未经 `close`/`discard` 就被 drop 时必须断开，而不是归还连接池，
    /// 否则会话上的锁会随连接留在池中。租用中途失败时的清理错误写入 `logger`。
    async fn lease(&self, logger: &dyn Logger) -> std::result::Result<Self::Session, sqlx::Error>;

    /// 从另一条连接中止 `backend_id` 上正在执行的查询
    async fn abort(&self, backend_id: i64) -> std::result::Result<(), sqlx::Error>;
}

/// 与后端无关的获取流程
pub struct SessionLocker<P: SessionPool> {
    pool: P,
    logger: Arc<dyn Logger>,
}

impl<P: SessionPool> SessionLocker<P> {
    pub fn new(pool: P) -> Self {
        Self {
            pool,
            logger: default_logger(),
        }
    }

    /// 替换异常上报使用的 logger
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// 获取 `key` 对应的锁，阻塞直到成功或上下文结束
    #[instrument(skip(self, ctx), fields(backend = P::BACKEND))]
    pub async fn acquire(
        &self,
        ctx: &LockContext,
        key: <P::Session as AdvisorySession>::Key,
    ) -> Result<SessionLock<P::Session>> {
        let started = Instant::now();
        let result = self.acquire_inner(ctx, key).await;

        let outcome = match &result {
            Ok(_) => {
                metrics::histogram!("locker_acquire_duration_seconds", "backend" => P::BACKEND)
                    .record(started.elapsed().as_secs_f64());
                "acquired"
            }
            Err(err) => err.code(),
        };
        metrics::counter!(
            "locker_acquire_total",
            "backend" => P::BACKEND,
            "outcome" => outcome
        )
        .increment(1);

        result
    }

    async fn acquire_inner(
        &self,
        ctx: &LockContext,
        key: <P::Session as AdvisorySession>::Key,
    ) -> Result<SessionLock<P::Session>> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let session = tokio::select! {
            biased;
            leased = self.pool.lease(self.logger.as_ref()) => leased.map_err(LockError::Connection)?,
            err = ctx.done() => return Err(err.into()),
        };
        debug!(backend_id = session.backend_id(), "会话已租用，等待后端授予锁");

        // 从这里到获取结束，future 被 drop 时由守卫中止查询并关闭会话
        let mut pending = PendingSession::new(session, &self.pool, &self.logger);
        let acquired: std::result::Result<Result<()>, ContextError> = tokio::select! {
            biased;
            locked = pending.session_mut().lock(&key) => Ok(locked),
            err = ctx.done() => Err(err),
        };

        match acquired {
            Ok(Ok(())) => {
                let lock = SessionLock::new(
                    pending.into_inner(),
                    key,
                    P::BACKEND,
                    Arc::clone(&self.logger),
                );
                // 后端已授予锁但上下文在此之前结束：释放这次授予，按上下文错误返回
                if let Some(err) = ctx.err() {
                    debug!(?err, "锁已授予但上下文已结束，后台释放");
                    tokio::spawn(async move {
                        lock.release().await;
                    });
                    return Err(err.into());
                }
                debug!("锁已获取");
                Ok(lock)
            }
            Ok(Err(err)) => {
                if let Err(close_err) = pending.into_inner().close().await {
                    logf!(
                        self.logger,
                        "{}: 关闭连接时发生错误: {close_err}",
                        P::BACKEND
                    );
                }
                Err(err)
            }
            Err(err) => {
                debug!(?err, "等待锁期间上下文结束，后台中止查询并关闭会话");
                drop(pending);
                Err(err.into())
            }
        }
    }
}

/// 正在等待后端授予锁的会话
///
/// 获取成功或失败时通过 `into_inner` 取回会话；在此之前被 drop
/// （上下文结束，或调用方直接丢弃了 `acquire` 的 future）即视为放弃：
/// 会话上的获取调用可能仍在后端排队，先中止查询再关闭连接，
/// 即便后端在此期间授予了锁，会话关闭时锁也随之释放。
struct PendingSession<P: SessionPool> {
    session: Option<P::Session>,
    pool: P,
    logger: Arc<dyn Logger>,
}

impl<P: SessionPool> PendingSession<P> {
    fn new(session: P::Session, pool: &P, logger: &Arc<dyn Logger>) -> Self {
        Self {
            session: Some(session),
            pool: pool.clone(),
            logger: Arc::clone(logger),
        }
    }

    fn session_mut(&mut self) -> &mut P::Session {
        self.session
            .as_mut()
            .unwrap_or_else(|| unreachable!("会话只在 into_inner 或 drop 时取出"))
    }

    fn into_inner(mut self) -> P::Session {
        self.session
            .take()
            .unwrap_or_else(|| unreachable!("会话只在 into_inner 或 drop 时取出"))
    }
}

impl<P: SessionPool> Drop for PendingSession<P> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            // 没有运行时可用：直接断开连接，后端随会话结束放弃等待
            Err(_) => return session.discard(),
        };

        let pool = self.pool.clone();
        let logger = Arc::clone(&self.logger);
        runtime.spawn(async move {
            let backend_id = session.backend_id();
            match tokio::time::timeout(ABORT_TIMEOUT, pool.abort(backend_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => logf!(
                    logger,
                    "{}: 中止会话 {backend_id} 的查询失败: {err}",
                    P::BACKEND
                ),
                Err(_) => logf!(
                    logger,
                    "{}: 中止会话 {backend_id} 的查询超时",
                    P::BACKEND
                ),
            }
            if let Err(err) = session.close().await {
                logf!(logger, "{}: 关闭连接时发生错误: {err}", P::BACKEND);
            }
        });
    }
}

impl<P: SessionPool> Clone for SessionLocker<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            logger: Arc::clone(&self.logger),
        }
    }
}

impl<P: SessionPool + fmt::Debug> fmt::Debug for SessionLocker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLocker")
            .field("backend", &P::BACKEND)
            .field("pool", &self.pool)
            .finish()
    }
}
