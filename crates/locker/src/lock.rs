//! 已获取的锁句柄
//!
//! 句柄独占一个租用的会话。释放只会真正执行一次：`AtomicBool` 上的
//! compare-and-swap 选出唯一的执行者，其余并发或后续调用直接返回
//! `AlreadyReleased`，没有任何副作用。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::logger::{Logger, logf};
use crate::session::AdvisorySession;

/// 释放时观察到的非致命异常
///
/// 此时已没有需要保护的锁状态，只上报，不中断连接清理。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseAnomaly {
    /// 后端报告锁并未被当前会话持有（后端重启、会话失效等）
    #[error("锁已不被当前会话持有")]
    NotHeld,

    #[error("释放锁失败: {0}")]
    Backend(String),
}

/// 一次 `release` 调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// 本次调用执行了释放
    Released,
    /// 之前已经释放过，本次调用什么都没做
    AlreadyReleased,
    /// 本次调用执行了释放，但后端结果不符合预期；连接仍已关闭
    Anomaly(ReleaseAnomaly),
}

impl ReleaseOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Released => "released",
            Self::AlreadyReleased => "already_released",
            Self::Anomaly(ReleaseAnomaly::NotHeld) => "not_held",
            Self::Anomaly(ReleaseAnomaly::Backend(_)) => "error",
        }
    }
}

/// 绑定在单个会话上的锁
pub struct SessionLock<S: AdvisorySession> {
    key: S::Key,
    session: Mutex<Option<S>>,
    released: AtomicBool,
    backend: &'static str,
    logger: Arc<dyn Logger>,
}

impl<S: AdvisorySession> SessionLock<S> {
    pub(crate) fn new(
        session: S,
        key: S::Key,
        backend: &'static str,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            key,
            session: Mutex::new(Some(session)),
            released: AtomicBool::new(false),
            backend,
            logger,
        }
    }

    /// 锁的原生标识
    pub fn key(&self) -> &S::Key {
        &self.key
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// 释放锁并关闭会话
    ///
    /// 在持有锁的同一个会话上调用后端的释放函数，无论结果如何都关闭会话。
    /// 可以并发、重复调用，只有第一次会访问后端。
    pub async fn release(&self) -> ReleaseOutcome {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return ReleaseOutcome::AlreadyReleased;
        }
        let Some(session) = self.session.lock().take() else {
            return ReleaseOutcome::AlreadyReleased;
        };
        let mut releasing = ReleasingSession {
            session: Some(session),
            backend: self.backend,
            logger: self.logger.as_ref(),
        };
        release_session(&mut releasing, &self.key).await
    }
}

impl<S: AdvisorySession> Drop for SessionLock<S> {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(session) = self.session.get_mut().take() else {
            return;
        };
        logf!(
            self.logger,
            "{}: 锁 {:?} 未释放即被丢弃，转入后台释放",
            self.backend,
            self.key
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let key = self.key.clone();
                let backend = self.backend;
                let logger = Arc::clone(&self.logger);
                runtime.spawn(async move {
                    let mut releasing = ReleasingSession {
                        session: Some(session),
                        backend,
                        logger: logger.as_ref(),
                    };
                    release_session(&mut releasing, &key).await;
                });
            }
            // 没有运行时可用：直接断开连接，会话结束后后端自动释放锁
            Err(_) => session.discard(),
        }
    }
}

impl<S: AdvisorySession> fmt::Debug for SessionLock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLock")
            .field("backend", &self.backend)
            .field("key", &self.key)
            .field("released", &self.is_released())
            .finish()
    }
}

/// 已从句柄中取出、正在执行释放的会话
///
/// `release` 的 future 可能在 unlock 途中被丢弃。此时释放标记已经置位，
/// 句柄不会再尝试释放，由这里同步断开连接，让后端随会话结束释放锁。
struct ReleasingSession<'a, S: AdvisorySession> {
    session: Option<S>,
    backend: &'static str,
    logger: &'a dyn Logger,
}

impl<S: AdvisorySession> Drop for ReleasingSession<'_, S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            logf!(
                self.logger,
                "{}: 释放流程被中断，断开会话 {}",
                self.backend,
                session.backend_id()
            );
            session.discard();
        }
    }
}

/// 释放流程：unlock → close，close 失败只记录日志
///
/// 会话在 close 之前从 `releasing` 中取出，之后 `releasing` 的 drop 不再有动作。
async fn release_session<S: AdvisorySession>(
    releasing: &mut ReleasingSession<'_, S>,
    key: &S::Key,
) -> ReleaseOutcome {
    let (backend, logger) = (releasing.backend, releasing.logger);
    let Some(session) = releasing.session.as_mut() else {
        return ReleaseOutcome::AlreadyReleased;
    };
    let unlocked = session.unlock(key).await;

    if let Some(session) = releasing.session.take() {
        if let Err(err) = session.close().await {
            logf!(logger, "{backend}: 关闭连接时发生错误: {err}");
        }
    }

    let outcome = match unlocked {
        Ok(true) => ReleaseOutcome::Released,
        Ok(false) => {
            logf!(logger, "{backend}: 锁 {key:?} 已不被当前会话持有");
            ReleaseOutcome::Anomaly(ReleaseAnomaly::NotHeld)
        }
        Err(err) => {
            logf!(logger, "{backend}: 释放锁 {key:?} 失败: {err}");
            ReleaseOutcome::Anomaly(ReleaseAnomaly::Backend(err.to_string()))
        }
    };

    metrics::counter!(
        "locker_release_total",
        "backend" => backend,
        "outcome" => outcome.label()
    )
    .increment(1);

    outcome
}
