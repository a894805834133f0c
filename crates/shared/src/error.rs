//! 统一错误处理模块
//!
//! 基础设施层的错误类型，锁本身的错误见 `db_locker::LockError`。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("未配置 {backend} 连接串")]
    MissingUrl { backend: &'static str },

    // ==================== 可观测性错误 ====================
    #[error("日志初始化失败: {0}")]
    Tracing(String),

    #[error("指标导出初始化失败: {0}")]
    Metrics(String),
}

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::MissingUrl { .. } => "MISSING_URL",
            Self::Tracing(_) => "TRACING_ERROR",
            Self::Metrics(_) => "METRICS_ERROR",
        }
    }
}

/// 统一 Result 类型
pub type Result<T> = std::result::Result<T, SharedError>;
