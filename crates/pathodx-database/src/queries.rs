//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use chrono::Utc;
use pathodx_core::{DiagnosisRecord, PathoError, ReportRecord, Result, UserAccount, UserRole};

/// 列表查询公共部分：诊断记录附带提交人显示名称
const DIAGNOSIS_COLUMNS: &str = r#"
    SELECT d.id, d.user_id, d.patient_name, d.patient_id, d.image_path,
           d.prediction_result, d.diagnosis_type, d.notes, d.report_id, d.created_at,
           u.display_name AS user_name
    FROM diagnoses d
    LEFT JOIN users u ON u.id = d.user_id
"#;

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 用户表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(pool)
        .await?;

        // 诊断记录表, report_id 指向最近一次生成的报告
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS diagnoses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                patient_name TEXT,
                patient_id TEXT,
                image_path TEXT NOT NULL,
                prediction_result TEXT NOT NULL,
                diagnosis_type TEXT NOT NULL,
                notes TEXT,
                report_id INTEGER,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(pool)
        .await?;

        // 报告表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                diagnosis_id INTEGER NOT NULL REFERENCES diagnoses(id),
                user_id INTEGER NOT NULL REFERENCES users(id),
                report_type TEXT NOT NULL CHECK (report_type IN ('pdf', 'word')),
                file_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(pool)
        .await?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_diagnoses_user_id ON diagnoses(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_diagnoses_created_at ON diagnoses(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_reports_diagnosis_id ON reports(diagnosis_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        Ok(())
    }

    // ========== 用户相关操作 ==========

    /// 创建新用户
    pub async fn create_user(&self, user: &NewUser) -> Result<i64> {
        let pool = self.pool.pool();

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, display_name, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PathoError::Validation(format!("用户名已存在: {}", user.username))
            }
            other => PathoError::from(other),
        })?;

        Ok(result.last_insert_rowid())
    }

    /// 根据用户名查找用户
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(pool)
            .await?;

        Ok(result.map(UserAccount::from))
    }

    /// 根据ID查找用户
    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<UserAccount>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(result.map(UserAccount::from))
    }

    // ========== 诊断相关操作 ==========

    /// 创建诊断记录, 影像文件必须已存在
    pub async fn create_diagnosis(&self, diagnosis: &NewDiagnosis) -> Result<i64> {
        let pool = self.pool.pool();

        if tokio::fs::metadata(&diagnosis.image_path).await.is_err() {
            return Err(PathoError::Validation(format!(
                "影像文件不存在: {}",
                diagnosis.image_path
            )));
        }

        let prediction_json = serde_json::to_string(&diagnosis.prediction)?;

        let result = sqlx::query(
            r#"
            INSERT INTO diagnoses (user_id, patient_name, patient_id, image_path,
                                   prediction_result, diagnosis_type, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        )
        .bind(diagnosis.user_id)
        .bind(&diagnosis.patient_name)
        .bind(&diagnosis.patient_id)
        .bind(&diagnosis.image_path)
        .bind(prediction_json)
        .bind(diagnosis.diagnosis_type())
        .bind(&diagnosis.notes)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 按角色获取诊断记录（最新在前）
    ///
    /// 管理员获取全部记录，普通用户只获取自己的记录。
    pub async fn get_diagnoses(&self, user_id: i64, role: UserRole) -> Result<Vec<DiagnosisRecord>> {
        let pool = self.pool.pool();

        let rows = if role.is_admin() {
            let sql = format!("{DIAGNOSIS_COLUMNS} ORDER BY d.created_at DESC, d.id DESC");
            sqlx::query_as::<_, DbDiagnosis>(&sql).fetch_all(pool).await?
        } else {
            let sql = format!(
                "{DIAGNOSIS_COLUMNS} WHERE d.user_id = ?1 ORDER BY d.created_at DESC, d.id DESC"
            );
            sqlx::query_as::<_, DbDiagnosis>(&sql)
                .bind(user_id)
                .fetch_all(pool)
                .await?
        };

        rows.into_iter().map(DiagnosisRecord::try_from).collect()
    }

    /// 根据ID获取诊断记录
    pub async fn get_diagnosis_by_id(&self, id: i64) -> Result<Option<DiagnosisRecord>> {
        let pool = self.pool.pool();

        let sql = format!("{DIAGNOSIS_COLUMNS} WHERE d.id = ?1");
        let result = sqlx::query_as::<_, DbDiagnosis>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        result.map(DiagnosisRecord::try_from).transpose()
    }

    // ========== 报告相关操作 ==========

    /// 创建报告记录并回写诊断记录的报告链接
    pub async fn create_report(&self, report: &NewReport) -> Result<i64> {
        let mut tx = self.pool.pool().begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM diagnoses WHERE id = ?1")
            .bind(report.diagnosis_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(PathoError::NotFound(format!(
                "诊断记录不存在: {}",
                report.diagnosis_id
            )));
        }

        let report_id = sqlx::query(
            r#"
            INSERT INTO reports (diagnosis_id, user_id, report_type, file_path, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        )
        .bind(report.diagnosis_id)
        .bind(report.user_id)
        .bind(report.report_type.as_str())
        .bind(&report.file_path)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE diagnoses SET report_id = ?1 WHERE id = ?2")
            .bind(report_id)
            .bind(report.diagnosis_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(report_id)
    }

    /// 根据ID获取报告记录
    pub async fn get_report_by_id(&self, id: i64) -> Result<Option<ReportRecord>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbReport>("SELECT * FROM reports WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        result.map(ReportRecord::try_from).transpose()
    }
}
