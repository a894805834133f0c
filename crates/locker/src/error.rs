//! 锁错误类型
//!
//! 调用方只需要区分两类情况："稍后重试" 与 "修正集成方式"。
//! `kind()` 把具体错误归入一个很小的封闭集合，`is_retryable()` 给出重试建议。

use thiserror::Error;

use crate::context::ContextError;

/// 锁操作错误
#[derive(Debug, Error)]
pub enum LockError {
    /// 无法从连接池租用连接
    #[error("获取数据库连接失败: {0}")]
    Connection(#[source] sqlx::Error),

    /// 获取锁的查询本身执行失败
    #[error("{op} 执行失败: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("获取锁已取消")]
    Cancelled,

    #[error("获取锁超时")]
    DeadlineExceeded,

    /// 后端返回了约定之外的结果，不可重试
    #[error("{op} 返回了非预期结果: {detail}")]
    Protocol { op: &'static str, detail: String },

    #[error("无效的锁名 {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Cancelled,
    DeadlineExceeded,
    Protocol,
    InvalidKey,
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LockError>;

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Backend { source, .. } if is_transport_error(source) => ErrorKind::Connection,
            Self::Backend { .. } | Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::InvalidKey { .. } => ErrorKind::InvalidKey,
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorKind::Protocol => "PROTOCOL_ERROR",
            ErrorKind::InvalidKey => "INVALID_KEY",
        }
    }

    /// 是否为可重试错误
    ///
    /// 取消和超时由调用方决定是否换一个新的上下文重来，这里不算可重试。
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }

    pub(crate) fn protocol(op: &'static str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ContextError> for LockError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// 连接层面的失败（网络、TLS、连接池）
fn is_transport_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
