//! # PathoDx分类模块
//!
//! 调用外部病理分类进程（CNN预测脚本），解析其结构化输出，
//! 并根据病理类型目录补充病变类别、严重程度等信息。

pub mod catalog;
pub mod classifier;
pub mod output;
pub mod subprocess;

pub use catalog::*;
pub use classifier::Classifier;
pub use subprocess::{ClassifierConfig, SubprocessClassifier};
