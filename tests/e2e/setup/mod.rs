//! 测试环境设置模块
//!
//! 提供连接池构建以及绕过锁客户端直接查询锁状态的辅助函数。

mod environment;

pub use environment::{TestEnvironment, mysql_lock_is_free, postgres_lock_is_free};
