//! 测试工具模块
//!
//! 为需要真实数据库的测试提供连接配置。
//!
//! 连接串优先取 `TEST_MYSQL_URL` / `TEST_POSTGRES_URL`；
//! 否则按 `HOST_MYSQL_PORT` / `HOST_POSTGRES_PORT` 拼出本机地址，
//! 用户名、密码、库名均为 `develop`。

use crate::config::DatabaseConfig;

const TEST_CREDENTIALS: &str = "develop:develop";
const TEST_DATABASE: &str = "develop";

// ==================== 测试配置辅助 ====================

/// 测试用 MySQL 连接串
pub fn test_mysql_url() -> String {
    std::env::var("TEST_MYSQL_URL").unwrap_or_else(|_| {
        let port = std::env::var("HOST_MYSQL_PORT").unwrap_or_else(|_| "3306".to_string());
        format!("mysql://{TEST_CREDENTIALS}@127.0.0.1:{port}/{TEST_DATABASE}")
    })
}

/// 测试用 PostgreSQL 连接串
pub fn test_postgres_url() -> String {
    std::env::var("TEST_POSTGRES_URL").unwrap_or_else(|_| {
        let port = std::env::var("HOST_POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
        format!("postgres://{TEST_CREDENTIALS}@127.0.0.1:{port}/{TEST_DATABASE}?sslmode=disable")
    })
}

/// 创建测试用数据库配置
///
/// 并发测试同时持有 10 把锁，被取消的等待者还需要额外连接中止查询，连接数留足余量。
pub fn test_database_config() -> DatabaseConfig {
    DatabaseConfig {
        mysql_url: test_mysql_url(),
        postgres_url: test_postgres_url(),
        max_connections: 32,
        min_connections: 0,
        connect_timeout_seconds: 10,
        idle_timeout_seconds: 60,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_pool_size() {
        let config = test_database_config();
        assert!(config.max_connections >= 25);
        assert!(config.mysql_url.starts_with("mysql://"));
        assert!(config.postgres_url.starts_with("postgres://"));
    }
}
