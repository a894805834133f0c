//! 异常上报用的日志接口
//!
//! 只用于非致命异常（释放时发现锁已不在、关闭连接失败等），不参与控制流。
//! 每个 locker 实例在构造时注入自己的 `Logger`，默认实现转发到 `tracing`。

use std::fmt;
use std::sync::Arc;

/// 日志接口
pub trait Logger: Send + Sync {
    /// 按格式化参数输出一条日志
    fn printf(&self, args: fmt::Arguments<'_>) {
        self.println(&args.to_string());
    }

    /// 输出一条日志
    fn println(&self, message: &str);
}

/// 转发到 `tracing::warn!` 的默认实现
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn println(&self, message: &str) {
        tracing::warn!(target: "db_locker", "{}", message);
    }
}

pub(crate) fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

/// 以 printf 风格写入注入的 logger
macro_rules! logf {
    ($logger:expr, $($arg:tt)*) => {
        $logger.printf(format_args!($($arg)*))
    };
}

pub(crate) use logf;
