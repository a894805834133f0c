//! 锁持有命令
//!
//! 获取指定名称的锁后在 stdout 打印 `acquired`，一直持有到收到 SIGINT/SIGTERM，
//! 然后释放并以 0 退出。用于验证跨进程互斥，以及持有进程被杀死后锁随连接断开而释放。
//!
//! 等待锁期间收到信号同样以 0 退出；其他错误以 1 退出。

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use db_locker::{ErrorKind, LockContext, Locker};
use locker_shared::config::AppConfig;
use locker_shared::{database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// 获取并持有一把数据库 advisory lock
#[derive(Parser, Debug)]
#[command(name = "lockcmd")]
#[command(version, about = "获取并持有一把数据库 advisory lock，直到收到退出信号")]
struct Cli {
    /// 数据库后端
    #[arg(short, long, value_enum)]
    backend: BackendArg,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置
    #[arg(short, long)]
    log_level: Option<String>,

    /// 锁名
    key: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Mysql,
    Postgres,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("unexpected err: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut config = AppConfig::load("lockcmd").context("加载配置失败")?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    let guard = observability::init(&config.service_name, &config.observability)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_tx.send_replace(true);
    });
    let ctx = LockContext::background().with_shutdown(shutdown_rx);

    let locker = match cli.backend {
        BackendArg::Mysql => Locker::mysql(database::connect_mysql(&config.database).await?),
        BackendArg::Postgres => {
            Locker::postgres(database::connect_postgres(&config.database).await?)
        }
    };

    let lock = match locker.get(&ctx, &cli.key).await {
        Ok(lock) => lock,
        Err(err) if err.kind() == ErrorKind::Cancelled => {
            info!(key = %cli.key, "等待锁期间收到退出信号");
            return Ok(());
        }
        Err(err) => return Err(err).context("获取锁失败"),
    };

    let mut stdout = std::io::stdout();
    writeln!(stdout, "acquired")?;
    stdout.flush()?;
    info!(
        key = %cli.key,
        backend = %locker.backend(),
        metrics = guard.metrics_enabled(),
        "锁已获取，等待退出信号"
    );

    ctx.done().await;
    let outcome = lock.release().await;
    info!(key = %cli.key, ?outcome, "锁已释放");
    Ok(())
}

/// 退出信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, releasing lock..."),
        _ = terminate => info!("Received SIGTERM, releasing lock..."),
    }
}
