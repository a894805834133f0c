//! 测试套件模块
//!
//! 按后端和关注点组织的测试用例集合。

pub mod cancellation;
pub mod conformance;
pub mod mysql;
pub mod postgres;
