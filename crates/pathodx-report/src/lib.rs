//! # PathoDx报告模块
//!
//! 由诊断记录生成统一的报告内容，并渲染为PDF或Word文档。

pub mod content;
pub mod pdf;
pub mod renderer;
pub mod word;

pub use content::{ReportContent, Section, DISCLAIMER, REPORT_TITLE};
pub use renderer::{report_file_name, RenderedReport, ReportRenderer};
