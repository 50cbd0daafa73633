//! 诊断相关处理器
//!
//! 影像上传分类、诊断记录查询、报告生成与下载。

use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::PathRejection,
        Multipart, Path, State,
    },
    http::header,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Local;
use pathodx_core::{ClassificationResult, DiagnosisRecord, PathoError, ReportKind};
use pathodx_database::{DatabaseQueries, NewDiagnosis, NewReport};
use pathodx_report::ReportContent;
use pathodx_storage::ImageUpload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::state::AppState;

const MAX_PATIENT_FIELD_CHARS: usize = 100;
const MAX_NOTES_CHARS: usize = 2000;

/// 诊断响应
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub diagnosis_id: i64,
    pub prediction: ClassificationResult,
}

/// 诊断列表响应
#[derive(Debug, Serialize)]
pub struct DiagnosisList {
    pub diagnoses: Vec<DiagnosisRecord>,
    pub total: usize,
}

/// 报告生成请求
#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub report_type: Option<String>,
}

/// 报告生成响应
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report_id: i64,
    pub report_type: ReportKind,
    pub file_name: String,
    pub download_url: String,
}

fn form_error(e: impl std::fmt::Display) -> PathoError {
    PathoError::Validation(format!("无效的表单数据: {e}"))
}

async fn text_field(field: Field<'_>, label: &str, max_chars: usize) -> ApiResult<Option<String>> {
    let text = field.text().await.map_err(form_error)?;
    let text = text.trim();
    if text.chars().count() > max_chars {
        return Err(PathoError::Validation(format!("{label}不能超过{max_chars}个字符")).into());
    }
    Ok(Some(text.to_string()).filter(|t| !t.is_empty()))
}

/// 上传影像并进行AI诊断
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let mut multipart = multipart?;
    let mut image: Option<ImageUpload> = None;
    let mut patient_name = None;
    let mut patient_id = None;
    let mut notes = None;

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                if image.is_some() {
                    return Err(PathoError::Validation("每次只能上传一张图像".to_string()).into());
                }
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(form_error)?;
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            "patient_name" => {
                patient_name = text_field(field, "患者姓名", MAX_PATIENT_FIELD_CHARS).await?
            }
            "patient_id" => {
                patient_id = text_field(field, "患者编号", MAX_PATIENT_FIELD_CHARS).await?
            }
            "notes" => notes = text_field(field, "备注", MAX_NOTES_CHARS).await?,
            other => warn!("Ignoring unexpected form field: {}", other),
        }
    }

    let upload = image.ok_or_else(|| PathoError::Validation("请上传图像文件".to_string()))?;
    let staged = state.uploads.stage(upload).await?;
    info!(
        "User {} uploaded {} ({}, {} bytes)",
        user.username,
        staged.original_name.as_deref().unwrap_or(&staged.file_name),
        staged.format.mime_type(),
        staged.size
    );

    let prediction = match state.classifier.classify(&staged.path).await {
        Ok(prediction) => prediction,
        Err(e) => {
            warn!("Classification failed for {}: {}", staged.file_name, e);
            if let Err(discard) = state.uploads.discard(&staged).await {
                warn!("Failed to discard {}: {}", staged.file_name, discard);
            }
            return Err(e.into());
        }
    };

    let new_diagnosis = NewDiagnosis {
        user_id: user.id,
        patient_name,
        patient_id,
        image_path: staged.path_string(),
        prediction,
        notes,
    };

    let diagnosis_id = match DatabaseQueries::new(&state.db)
        .create_diagnosis(&new_diagnosis)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            if let Err(discard) = state.uploads.discard(&staged).await {
                warn!("Failed to discard {}: {}", staged.file_name, discard);
            }
            return Err(e.into());
        }
    };

    info!(
        "Diagnosis {} created by {}: {} ({})",
        diagnosis_id, user.username, new_diagnosis.prediction.result, new_diagnosis.prediction.diagnosis_type
    );

    Ok(Json(PredictResponse {
        diagnosis_id,
        prediction: new_diagnosis.prediction,
    }))
}

/// 诊断记录列表
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<impl IntoResponse> {
    let diagnoses = DatabaseQueries::new(&state.db)
        .get_diagnoses(user.id, user.role)
        .await?;

    Ok(Json(DiagnosisList {
        total: diagnoses.len(),
        diagnoses,
    }))
}

async fn load_visible(state: &AppState, user: &AuthenticatedUser, id: i64) -> ApiResult<DiagnosisRecord> {
    let record = DatabaseQueries::new(&state.db)
        .get_diagnosis_by_id(id)
        .await?
        .ok_or_else(|| PathoError::NotFound("诊断记录不存在".to_string()))?;

    if !record.is_visible_to(user.id, user.role) {
        warn!("User {} denied access to diagnosis {}", user.username, id);
        return Err(PathoError::Authorization("无权访问该诊断记录".to_string()).into());
    }
    Ok(record)
}

/// 诊断记录详情
pub async fn get_diagnosis(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let record = load_visible(&state, &user, id).await?;
    Ok(Json(record))
}

/// 生成诊断报告
pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    id: Result<Path<i64>, PathRejection>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    // 未提供报告类型时默认生成PDF
    let request: ReportRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReportRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| PathoError::Validation(format!("无效的请求数据: {e}")))?
    };
    let kind: ReportKind = request.report_type.as_deref().unwrap_or("pdf").parse()?;

    let record = load_visible(&state, &user, id).await?;

    // 检验人为发起报告请求的用户
    let content = ReportContent::from_record(&record, &user.display_name, Local::now());
    let rendered = state.renderer.render(&content, kind).await?;

    let report_id = match DatabaseQueries::new(&state.db)
        .create_report(&NewReport {
            diagnosis_id: record.id,
            user_id: user.id,
            report_type: kind,
            file_path: rendered.path.to_string_lossy().to_string(),
        })
        .await
    {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&rendered.path).await {
                warn!("Failed to remove report file {}: {}", rendered.file_name, cleanup);
            }
            return Err(e.into());
        }
    };

    info!(
        "Report {} ({}) generated for diagnosis {} by {}",
        report_id, kind, record.id, user.username
    );

    Ok(Json(ReportResponse {
        report_id,
        report_type: kind,
        file_name: rendered.file_name,
        download_url: format!("/api/diagnosis/reports/{report_id}/download"),
    }))
}

/// 下载报告文件
pub async fn download_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    report_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(report_id) = report_id?;
    let report = DatabaseQueries::new(&state.db)
        .get_report_by_id(report_id)
        .await?
        .ok_or_else(|| PathoError::NotFound("报告不存在".to_string()))?;

    if report.user_id != user.id && !user.role.is_admin() {
        warn!("User {} denied access to report {}", user.username, report_id);
        return Err(PathoError::Authorization("无权下载该报告".to_string()).into());
    }

    let data = state.layout.read_report(&report.file_path).await?;
    let file_name = std::path::Path::new(&report.file_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("report.{}", report.report_type.extension()));

    Ok((
        [
            (header::CONTENT_TYPE, report.report_type.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        data,
    ))
}
