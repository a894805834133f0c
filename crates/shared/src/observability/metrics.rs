//! Prometheus 指标模块
//!
//! 锁的指标由 `db_locker` 通过 metrics crate 的宏直接记录，
//! 这里负责安装 recorder 并在独立的 HTTP 端口上暴露，供 Prometheus 抓取。

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::error::{Result, SharedError};

/// 获取锁的次数，标签 backend、outcome
pub const ACQUIRE_TOTAL: &str = "locker_acquire_total";
/// 成功获取锁的耗时，标签 backend
pub const ACQUIRE_DURATION_SECONDS: &str = "locker_acquire_duration_seconds";
/// 释放锁的次数，标签 backend、outcome
pub const RELEASE_TOTAL: &str = "locker_release_total";

/// 初始化 Prometheus 指标导出
///
/// 必须在 tokio 运行时内调用，HTTP 监听任务由 exporter 自行启动。
pub fn init(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| SharedError::Metrics(e.to_string()))?;

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// 注册锁指标的描述
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中。
pub fn describe_metrics() {
    metrics::describe_counter!(ACQUIRE_TOTAL, "Total number of lock acquisitions by outcome");
    metrics::describe_histogram!(
        ACQUIRE_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent waiting for a lock to be granted"
    );
    metrics::describe_counter!(RELEASE_TOTAL, "Total number of lock releases by outcome");
}
