//! # PathoDx存储模块
//!
//! 负责上传影像的校验与暂存，以及上传目录和报告目录的管理。

pub mod storage;
pub mod upload;

pub use storage::*;
pub use upload::*;
