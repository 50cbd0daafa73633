//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PathoError;

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UserRole {
    /// 普通用户 - 仅能查看自己的诊断记录
    #[serde(rename = "user")]
    Standard,
    /// 管理员 - 可查看全部诊断记录
    #[serde(rename = "admin")]
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Standard => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = PathoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::Standard),
            "admin" => Ok(UserRole::Admin),
            other => Err(PathoError::Validation(format!("未知的用户角色: {other}"))),
        }
    }
}

/// 用户账户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// 备选诊断
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativePrediction {
    pub label: String,
    pub probability: f64,
}

/// 诊断补充信息（来自病理类型目录）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisDetails {
    pub description: String,
    pub severity: String,
    pub urgency: String,
    pub confidence_level: String,
    pub reliability: String,
}

/// 分类结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    /// 预测标签
    pub result: String,
    /// 置信度, 取值 [0, 1]
    pub confidence: f64,
    /// 按概率降序排列的备选诊断
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_predictions: Vec<AlternativePrediction>,
    /// 病变类别
    pub diagnosis_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DiagnosisDetails>,
}

/// 诊断记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: i64,
    pub user_id: i64,
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub image_path: String,
    pub prediction_result: ClassificationResult,
    pub diagnosis_type: String,
    pub notes: Option<String>,
    /// 最近一次生成的报告
    pub report_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// 提交人显示名称（列表查询时填充）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl DiagnosisRecord {
    /// 判断用户是否可以查看该记录
    pub fn is_visible_to(&self, user_id: i64, role: UserRole) -> bool {
        role.is_admin() || self.user_id == user_id
    }
}

/// 报告类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Pdf,
    Word,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Pdf => "pdf",
            ReportKind::Word => "word",
        }
    }

    /// 生成文件的扩展名
    pub fn extension(&self) -> &'static str {
        match self {
            ReportKind::Pdf => "pdf",
            ReportKind::Word => "docx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportKind::Pdf => "application/pdf",
            ReportKind::Word => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = PathoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(ReportKind::Pdf),
            "word" => Ok(ReportKind::Word),
            _ => Err(PathoError::Validation(
                "无效的报告类型，仅支持 pdf 或 word".to_string(),
            )),
        }
    }
}

/// 报告记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: i64,
    pub diagnosis_id: i64,
    pub user_id: i64,
    pub report_type: ReportKind,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}
