//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 生成不会冲突的文件名: `<毫秒时间戳>-<uuid>.<ext>`
pub fn unique_file_name(extension: &str) -> String {
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    )
}

/// 置信度格式化为两位小数的百分比, 例如 `0.87` -> `87.00%`
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.2}%", confidence * 100.0)
}

/// 概率值是否有效
pub fn is_probability(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_file_name() {
        let a = unique_file_name("jpg");
        let b = unique_file_name("jpg");
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
    }

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.87), "87.00%");
        assert_eq!(format_confidence(1.0), "100.00%");
        assert_eq!(format_confidence(0.12345), "12.35%");
        assert_eq!(format_confidence(0.0), "0.00%");
    }

    #[test]
    fn test_is_probability() {
        assert!(is_probability(0.0));
        assert!(is_probability(1.0));
        assert!(!is_probability(1.01));
        assert!(!is_probability(-0.1));
        assert!(!is_probability(f64::NAN));
    }
}
