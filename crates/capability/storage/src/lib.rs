//! # Metbridge Storage 模块
//!
//! 本模块提供采集数据的持久化抽象层，支持多种存储后端实现。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：`PersistenceGateway`，三类写入 + 连接可用性约定
//! 2. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 3. **连接管理层** (`connection.rs`)：数据库连接池管理
//! 4. **表结构层** (`schema.rs`)：幂等建表
//! 5. **实现层**：
//!    - `in_memory/`：内存存储实现（用于测试和接线）
//!    - `postgres/`：PostgreSQL 存储实现（生产环境使用）
//!
//! ## 写入语义
//!
//! - **只追加**：原始消息、采样记录、状态快照均为 insert，不做 upsert
//! - **独立事务**：每次调用单独提交，后续写入失败不会影响已提交的原始消息
//! - **可重试**：同一数据重复写入会产生重复行
//!
//! ## 连接可用性
//!
//! 调用方不推断连接状态，而是在处理每条消息前询问 `is_usable()`，
//! 不可用时调用 `reconnect()` 由实现方替换连接。

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod schema;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use schema::ensure_schema;
pub use traits::*;

pub use in_memory::InMemoryGateway;
pub use postgres::PgGateway;
