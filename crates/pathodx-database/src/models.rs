//! 数据库模型

use chrono::{DateTime, Utc};
use pathodx_core::models::*;
use pathodx_core::PathoError;
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库用户表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String, // 存储为字符串，转换为UserRole枚举
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for UserAccount {
    fn from(db_user: DbUser) -> Self {
        UserAccount {
            id: db_user.id,
            username: db_user.username,
            password_hash: db_user.password_hash,
            display_name: db_user.display_name,
            role: db_user.role.parse().unwrap_or(UserRole::Standard), // 未知角色按普通用户处理
            created_at: db_user.created_at,
        }
    }
}

/// 数据库诊断表（列表查询附带提交人姓名）
#[derive(Debug, FromRow)]
pub struct DbDiagnosis {
    pub id: i64,
    pub user_id: i64,
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub image_path: String,
    pub prediction_result: String, // JSON 序列化的分类结果
    pub diagnosis_type: String,
    pub notes: Option<String>,
    pub report_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub user_name: Option<String>,
}

impl TryFrom<DbDiagnosis> for DiagnosisRecord {
    type Error = PathoError;

    fn try_from(db_diagnosis: DbDiagnosis) -> Result<Self, Self::Error> {
        Ok(DiagnosisRecord {
            id: db_diagnosis.id,
            user_id: db_diagnosis.user_id,
            patient_name: db_diagnosis.patient_name,
            patient_id: db_diagnosis.patient_id,
            image_path: db_diagnosis.image_path,
            prediction_result: serde_json::from_str(&db_diagnosis.prediction_result)?,
            diagnosis_type: db_diagnosis.diagnosis_type,
            notes: db_diagnosis.notes,
            report_id: db_diagnosis.report_id,
            created_at: db_diagnosis.created_at,
            user_name: db_diagnosis.user_name,
        })
    }
}

/// 数据库报告表
#[derive(Debug, FromRow)]
pub struct DbReport {
    pub id: i64,
    pub diagnosis_id: i64,
    pub user_id: i64,
    pub report_type: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbReport> for ReportRecord {
    type Error = PathoError;

    fn try_from(db_report: DbReport) -> Result<Self, Self::Error> {
        Ok(ReportRecord {
            id: db_report.id,
            diagnosis_id: db_report.diagnosis_id,
            user_id: db_report.user_id,
            report_type: db_report.report_type.parse()?,
            file_path: db_report.file_path,
            created_at: db_report.created_at,
        })
    }
}

// 插入模型 - 用于创建新记录

/// 新用户插入模型
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
}

/// 新诊断插入模型
#[derive(Debug)]
pub struct NewDiagnosis {
    pub user_id: i64,
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub image_path: String,
    pub prediction: ClassificationResult,
    pub notes: Option<String>,
}

impl NewDiagnosis {
    /// 病变类别取自分类结果
    pub fn diagnosis_type(&self) -> &str {
        &self.prediction.diagnosis_type
    }
}

/// 新报告插入模型
#[derive(Debug)]
pub struct NewReport {
    pub diagnosis_id: i64,
    pub user_id: i64,
    pub report_type: ReportKind,
    pub file_path: String,
}
