//! 共享库
//!
//! 包含锁服务与测试共用的配置加载、数据库连接池构建、可观测性初始化等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod test_utils;
