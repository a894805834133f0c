//! 数据库锁端到端测试
//!
//! 在真实的 MySQL / PostgreSQL 上验证：
//! - 一致性（互斥、释放唤醒、不同 key 独立、重复释放）
//! - 取消与超时后连接和锁的回收
//! - 各后端特有的 key 处理
//!
//! 需要数据库，默认忽略：`cargo test --test e2e -- --ignored`

pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
