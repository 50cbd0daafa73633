//! 报告内容模型
//!
//! PDF与Word两种渲染器共用同一份内容，保证两种格式的报告内容一致。

use chrono::{DateTime, Local};
use pathodx_core::utils::format_confidence;
use pathodx_core::DiagnosisRecord;
use serde::Serialize;

pub const REPORT_TITLE: &str = "法医病理辅助诊断报告";
pub const NOT_PROVIDED: &str = "未填写";
pub const DISCLAIMER: &str = "本报告仅作为辅助诊断参考，不能替代执业医师的临床判断。最终诊断应由合格的专业医师结合患者的完整临床信息做出。";
pub const FOOTER: &str = "本报告由法医病理辅助诊断系统自动生成";

/// 报告中的一项 "名称: 值"
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Field {
    pub label: String,
    pub value: String,
}

impl Field {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
        }
    }

    pub fn line(&self) -> String {
        format!("{}: {}", self.label, self.value)
    }
}

/// 渲染用的章节
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Section {
    pub heading: String,
    pub lines: Vec<String>,
}

/// 报告内容
#[derive(Debug, Clone, Serialize)]
pub struct ReportContent {
    pub diagnosis_id: i64,
    pub title: String,
    pub report_number: String,
    pub generated_date: String,
    pub examiner: String,
    pub patient: Vec<Field>,
    pub diagnosis: Vec<Field>,
    pub alternatives: Vec<String>,
    pub analysis: Vec<Field>,
    pub notes: Option<String>,
    pub disclaimer: String,
    pub footer: String,
}

impl ReportContent {
    pub fn from_record(record: &DiagnosisRecord, examiner: &str, generated_at: DateTime<Local>) -> Self {
        let prediction = &record.prediction_result;

        let patient = vec![
            Field::new("患者姓名", or_not_provided(record.patient_name.as_deref())),
            Field::new("患者编号", or_not_provided(record.patient_id.as_deref())),
        ];

        let mut diagnosis = vec![
            Field::new("病变类别", record.diagnosis_type.clone()),
            Field::new("诊断结果", prediction.result.clone()),
            Field::new("置信度", format_confidence(prediction.confidence)),
        ];

        let mut analysis = Vec::new();
        if let Some(details) = &prediction.details {
            diagnosis.push(Field::new("病理描述", details.description.clone()));
            analysis.push(Field::new("严重程度", details.severity.clone()));
            analysis.push(Field::new("紧急程度", details.urgency.clone()));
            analysis.push(Field::new("置信度等级", details.confidence_level.clone()));
            analysis.push(Field::new("结果可靠性", details.reliability.clone()));
        }
        analysis.push(Field::new(
            "建议",
            recommendation(&prediction.result, prediction.confidence),
        ));

        let alternatives = prediction
            .all_predictions
            .iter()
            .filter(|alt| alt.label != prediction.result)
            .map(|alt| format!("{}: {}", alt.label, format_confidence(alt.probability)))
            .collect();

        let notes = record
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Self {
            diagnosis_id: record.id,
            title: REPORT_TITLE.to_string(),
            report_number: format!("DXR-{}-{:06}", generated_at.format("%Y%m%d"), record.id),
            generated_date: generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            examiner: examiner.to_string(),
            patient,
            diagnosis,
            alternatives,
            analysis,
            notes,
            disclaimer: DISCLAIMER.to_string(),
            footer: FOOTER.to_string(),
        }
    }

    /// 标题下方的元信息
    pub fn metadata(&self) -> Vec<String> {
        vec![
            format!("报告编号: {}", self.report_number),
            format!("生成日期: {}", self.generated_date),
            format!("检验人员: {}", self.examiner),
        ]
    }

    /// 正文章节, 按显示顺序
    pub fn sections(&self) -> Vec<Section> {
        let mut sections = vec![
            Section {
                heading: "一、患者信息".to_string(),
                lines: self.patient.iter().map(Field::line).collect(),
            },
            Section {
                heading: "二、诊断结果".to_string(),
                lines: self.diagnosis.iter().map(Field::line).collect(),
            },
        ];

        if !self.alternatives.is_empty() {
            sections.push(Section {
                heading: "三、其他可能诊断".to_string(),
                lines: self.alternatives.clone(),
            });
        }

        sections.push(Section {
            heading: format!("{}、结果分析", ordinal(sections.len() + 1)),
            lines: self.analysis.iter().map(Field::line).collect(),
        });

        if let Some(notes) = &self.notes {
            sections.push(Section {
                heading: format!("{}、备注", ordinal(sections.len() + 1)),
                lines: vec![notes.clone()],
            });
        }

        sections
    }

    /// 报告全文, 用于检索与测试
    pub fn plain_text(&self) -> String {
        let mut out = vec![self.title.clone()];
        out.extend(self.metadata());
        for section in self.sections() {
            out.push(section.heading);
            out.extend(section.lines);
        }
        out.push(self.disclaimer.clone());
        out.push(self.footer.clone());
        out.join("\n")
    }
}

fn or_not_provided(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_PROVIDED)
        .to_string()
}

fn ordinal(n: usize) -> &'static str {
    match n {
        1 => "一",
        2 => "二",
        3 => "三",
        4 => "四",
        5 => "五",
        _ => "六",
    }
}

/// 根据置信度给出的处理建议
fn recommendation(label: &str, confidence: f64) -> String {
    if confidence >= 0.8 {
        format!("建议立即进行{label}的临床确认和相关检查")
    } else if confidence >= 0.6 {
        format!("建议进行进一步的影像学和实验室检查以确认{label}")
    } else {
        "建议密切观察临床症状变化，必要时重复检查".to_string()
    }
}
