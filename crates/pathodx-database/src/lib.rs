//! # PathoDx数据库模块
//!
//! 负责用户、诊断记录和报告记录的持久化，提供SQLite连接池和查询操作。

pub mod connection;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use queries::DatabaseQueries;
