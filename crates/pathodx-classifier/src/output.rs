//! 分类进程输出解析
//!
//! 预测脚本可能先输出日志，最后一行JSON对象才是结果。支持两种格式:
//!
//! - 扁平格式: `{"predicted_class": "肺炎", "confidence": 0.87, "top_k_predictions": [...]}`
//! - 接口格式: `{"success": true, "prediction": {"class": "肺炎", "confidence": 0.87}, "top_predictions": [...]}`

use crate::catalog::PathologyCatalog;
use pathodx_core::utils::is_probability;
use pathodx_core::{AlternativePrediction, ClassificationResult, PathoError, Result};
use serde::Deserialize;
use std::cmp::Ordering;

#[derive(Debug, Deserialize)]
struct RawAlternative {
    #[serde(alias = "label")]
    class: String,
    probability: f64,
}

#[derive(Debug, Deserialize)]
struct FlatOutput {
    predicted_class: String,
    confidence: f64,
    #[serde(default)]
    top_k_predictions: Vec<RawAlternative>,
    #[serde(default)]
    all_predictions: Vec<RawAlternative>,
    #[serde(default)]
    diagnosis_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopePrediction {
    class: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct EnvelopeOutput {
    success: bool,
    #[serde(default)]
    prediction: Option<EnvelopePrediction>,
    #[serde(default)]
    top_predictions: Vec<RawAlternative>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOutput {
    Envelope(EnvelopeOutput),
    Flat(FlatOutput),
}

/// 解析分类进程的标准输出
pub fn parse_output(stdout: &str, catalog: &PathologyCatalog) -> Result<ClassificationResult> {
    let value = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| {
            serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .filter(|v| v.is_object())
        })
        .ok_or_else(|| PathoError::prediction("分类进程没有输出有效的JSON结果"))?;

    let raw: RawOutput = serde_json::from_value(value)
        .map_err(|e| PathoError::prediction(format!("无法解析分类结果: {e}")))?;

    let (label, confidence, alternatives, diagnosis_type) = match raw {
        RawOutput::Flat(flat) => {
            let alternatives = if flat.top_k_predictions.is_empty() {
                flat.all_predictions
            } else {
                flat.top_k_predictions
            };
            (flat.predicted_class, flat.confidence, alternatives, flat.diagnosis_type)
        }
        RawOutput::Envelope(envelope) => {
            if !envelope.success {
                let reason = envelope
                    .error
                    .unwrap_or_else(|| "分类进程报告失败".to_string());
                return Err(PathoError::prediction(reason));
            }
            let prediction = envelope
                .prediction
                .ok_or_else(|| PathoError::prediction("分类结果缺少 prediction 字段"))?;
            (prediction.class, prediction.confidence, envelope.top_predictions, None)
        }
    };

    build_result(label, confidence, alternatives, diagnosis_type, catalog)
}

fn build_result(
    label: String,
    confidence: f64,
    alternatives: Vec<RawAlternative>,
    diagnosis_type: Option<String>,
    catalog: &PathologyCatalog,
) -> Result<ClassificationResult> {
    let label = label.trim().to_string();
    if label.is_empty() {
        return Err(PathoError::prediction("分类结果的标签为空"));
    }

    if !is_probability(confidence) {
        return Err(PathoError::prediction(format!(
            "置信度超出范围: {confidence}"
        )));
    }

    let mut all_predictions = Vec::with_capacity(alternatives.len());
    for alt in alternatives {
        if !is_probability(alt.probability) {
            return Err(PathoError::prediction(format!(
                "备选诊断 {} 的概率超出范围: {}",
                alt.class, alt.probability
            )));
        }
        all_predictions.push(AlternativePrediction {
            label: alt.class,
            probability: alt.probability,
        });
    }
    all_predictions.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
    });

    let diagnosis_type = diagnosis_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| catalog.category_of(&label).to_string());

    let details = Some(catalog.details_for(&label, confidence));

    Ok(ClassificationResult {
        result: label,
        confidence,
        all_predictions,
        diagnosis_type,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(stdout: &str) -> Result<ClassificationResult> {
        parse_output(stdout, &PathologyCatalog::new())
    }

    #[test]
    fn test_flat_output() {
        let result = parse(r#"{"predicted_class": "肺炎", "confidence": 0.87}"#).unwrap();
        assert_eq!(result.result, "肺炎");
        assert_eq!(result.confidence, 0.87);
        assert_eq!(result.diagnosis_type, "肺部病变");
        assert!(result.all_predictions.is_empty());

        let details = result.details.unwrap();
        assert_eq!(details.confidence_level, "高");
        assert_eq!(details.reliability, "可靠");
    }

    #[test]
    fn test_last_json_line_wins_over_logs() {
        let stdout = "Loading model...\n{\"progress\": 1}\nUsing device cpu\n\
            {\"predicted_class\": \"心肌炎\", \"confidence\": 0.6, \"top_k_predictions\": \
            [{\"class\": \"冠心病\", \"probability\": 0.3, \"rank\": 2}, \
             {\"class\": \"心肌炎\", \"probability\": 0.6, \"rank\": 1}]}\n\n";
        let result = parse(stdout).unwrap();
        assert_eq!(result.result, "心肌炎");
        assert_eq!(result.diagnosis_type, "心血管病变");
        assert_eq!(result.all_predictions.len(), 2);
        assert_eq!(result.all_predictions[0].label, "心肌炎");
        assert_eq!(result.all_predictions[1].label, "冠心病");
    }

    #[test]
    fn test_envelope_output() {
        let stdout = r#"{"success": true, "prediction": {"class": "脑出血", "confidence": 0.93, "description": "脑实质出血，血肿形成", "threshold_met": true}, "top_predictions": [{"class": "脑出血", "probability": 0.93}], "error": null}"#;
        let result = parse(stdout).unwrap();
        assert_eq!(result.result, "脑出血");
        assert_eq!(result.diagnosis_type, "脑部病变");
        assert_eq!(result.details.unwrap().severity, "危重");
    }

    #[test]
    fn test_envelope_failure_is_prediction_error() {
        let err = parse(r#"{"success": false, "prediction": null, "error": "模型未加载"}"#)
            .unwrap_err();
        assert!(matches!(err, PathoError::Prediction(_)));
        assert!(err.to_string().contains("模型未加载"));
    }

    #[test]
    fn test_unknown_label_uses_default_category() {
        let result = parse(r#"{"predicted_class": "骨折", "confidence": 0.55}"#).unwrap();
        assert_eq!(result.diagnosis_type, "其他病变");
    }

    #[test]
    fn test_explicit_category_is_kept() {
        let result = parse(
            r#"{"predicted_class": "骨折", "confidence": 0.55, "diagnosis_type": "骨骼病变"}"#,
        )
        .unwrap();
        assert_eq!(result.diagnosis_type, "骨骼病变");
    }

    #[test]
    fn test_invalid_outputs_rejected() {
        let cases = [
            "",
            "no json here",
            "[1, 2, 3]",
            r#"{"foo": "bar"}"#,
            r#"{"predicted_class": "肺炎", "confidence": 1.5}"#,
            r#"{"predicted_class": "肺炎", "confidence": -0.1}"#,
            r#"{"predicted_class": "  ", "confidence": 0.5}"#,
            r#"{"predicted_class": "肺炎", "confidence": 0.5, "top_k_predictions": [{"class": "肺水肿", "probability": 2.0}]}"#,
            r#"{"success": true}"#,
        ];

        for case in cases {
            let result = parse(case);
            assert!(
                matches!(result, Err(PathoError::Prediction(_))),
                "expected prediction error for {case:?}"
            );
        }
    }
}
