//! 获取锁的执行上下文
//!
//! `get` 在后端的阻塞调用里等待锁，调用方通过 `LockContext` 控制这段等待：
//! 截止时间到达返回 `DeadlineExceeded`，收到取消信号返回 `Cancelled`。
//! 取消信号复用服务关闭时使用的 `watch::Receiver<bool>`。

use std::future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// 上下文结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// 收到取消信号
    Cancelled,
    /// 超过截止时间
    DeadlineExceeded,
}

/// 获取锁时的取消/超时上下文
///
/// 可以廉价 clone，clone 出的上下文共享同一个取消信号和截止时间。
#[derive(Debug, Clone, Default)]
pub struct LockContext {
    deadline: Option<Instant>,
    shutdown: Option<watch::Receiver<bool>>,
}

/// 主动取消 `LockContext` 的句柄
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// 取消关联的上下文，重复调用无副作用
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl LockContext {
    /// 永不结束的上下文
    pub fn background() -> Self {
        Self::default()
    }

    /// 创建可主动取消的上下文
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self::background().with_shutdown(rx), CancelHandle { tx })
    }

    /// 在 `timeout` 之后结束
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// 在 `deadline` 结束；已有更早的截止时间时保留更早者
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        });
        self
    }

    /// 绑定关闭信号，通道值变为 `true` 时上下文以 `Cancelled` 结束
    ///
    /// 发送端被 drop 不视为取消。
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 上下文已结束时返回结束原因
    pub fn err(&self) -> Option<ContextError> {
        if self.shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// 等待上下文结束
    pub async fn done(&self) -> ContextError {
        let cancelled = async {
            match self.shutdown.clone() {
                Some(mut rx) => {
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        // 发送端已关闭且从未取消
                        future::pending::<()>().await;
                    }
                }
                None => future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => ContextError::Cancelled,
            _ = expired => ContextError::DeadlineExceeded,
        }
    }
}
