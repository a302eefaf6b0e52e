//! 内存存储实现模块
//!
//! 仅用于本地测试和接线。
//!
//! 包含以下实现：
//! - PersistenceGateway: InMemoryGateway

pub mod gateway;

pub use gateway::*;
