//! # PathoDx Web模块
//!
//! 提供诊断系统的HTTP接口：用户认证、影像诊断、诊断记录查询与报告下载。

pub mod auth;
pub mod diagnosis;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;


pub use auth::{AuthConfig, AuthService, AuthenticatedUser};
pub use error::{ApiError, ApiResult};
pub use server::{create_app, WebServer};
pub use state::AppState;
