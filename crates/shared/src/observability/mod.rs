//! 统一可观测性模块
//!
//! 提供 logging、metrics 的统一初始化。
//! 二进制程序通过单一入口点配置可观测性；作为库使用时由宿主程序自行安装 subscriber。

pub mod metrics;
pub mod tracing;

use ::tracing::info;

use crate::config::ObservabilityConfig;
use crate::error::Result;

/// 可观测性资源守卫
///
/// 持有可观测性资源的生命周期，drop 时记录关闭日志。
pub struct ObservabilityGuard {
    metrics_port: Option<u16>,
}

impl ObservabilityGuard {
    /// 是否启用了指标导出
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port.is_some()
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("Shutting down observability...");
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（配置了端口时导出 Prometheus 指标）
///
/// # Example
///
/// ```ignore
/// use locker_shared::config::AppConfig;
/// use locker_shared::observability;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::load("lockcmd")?;
///     let _guard = observability::init(&config.service_name, &config.observability)?;
///
///     // 应用逻辑...
///
///     Ok(())
/// }
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    if let Some(port) = config.metrics_port {
        metrics::init(port)?;
    }

    info!(
        service = %service_name,
        metrics_port = ?config.metrics_port,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        metrics_port: config.metrics_port,
    })
}
