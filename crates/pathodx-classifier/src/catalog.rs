//! 病理类型目录
//!
//! 15种已知病理类型到解剖学病变类别的映射，附带描述、严重程度与紧急程度。
//! 未收录的标签统一归入 [`DEFAULT_CATEGORY`]。

use pathodx_core::DiagnosisDetails;
use serde::Serialize;
use std::collections::HashMap;

/// 未知标签的默认病变类别
pub const DEFAULT_CATEGORY: &str = "其他病变";

const UNKNOWN_DESCRIPTION: &str = "暂无该病理类型的描述";
const UNKNOWN_SEVERITY: &str = "中";
const UNKNOWN_URGENCY: &str = "常规";

/// 病理类型条目
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PathologyEntry {
    pub label: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    /// 低 / 中 / 高 / 危重
    pub severity: &'static str,
    /// 常规 / 紧急 / 危急诊
    pub urgency: &'static str,
}

const fn entry(
    label: &'static str,
    category: &'static str,
    description: &'static str,
    severity: &'static str,
    urgency: &'static str,
) -> PathologyEntry {
    PathologyEntry {
        label,
        category,
        description,
        severity,
        urgency,
    }
}

static ENTRIES: [PathologyEntry; 15] = [
    entry("肺出血", "肺部病变", "肺部组织出血，可见红细胞渗出", "高", "紧急"),
    entry("肺水肿", "肺部病变", "肺部液体积聚，肺泡壁增厚", "中", "紧急"),
    entry("肺血栓", "肺部病变", "血管内血栓形成，阻塞血流", "危重", "危急诊"),
    entry("肺炎", "肺部病变", "肺部炎症反应，炎性细胞浸润", "中", "紧急"),
    entry("肝脂肪变性", "肝脏病变", "肝细胞内脂肪滴积聚", "低", "常规"),
    entry("冠心病", "心血管病变", "冠状动脉狭窄或阻塞", "高", "危急诊"),
    entry("脑出血", "脑部病变", "脑实质出血，血肿形成", "危重", "危急诊"),
    entry("脑水肿", "脑部病变", "脑组织水肿，压力增高", "危重", "危急诊"),
    entry("脑血管畸形", "脑部病变", "血管结构异常，发育异常", "高", "紧急"),
    entry("脑蛛网膜下腔淤血", "脑部病变", "蛛网膜下腔血液积聚", "高", "紧急"),
    entry("脾小动脉玻璃样改变", "脾脏病变", "小动脉壁玻璃样变性", "中", "常规"),
    entry("肾小球纤维化", "肾脏病变", "肾小球结构纤维化", "高", "紧急"),
    entry("心肌纤维断裂", "心血管病变", "心肌纤维结构破坏", "高", "危急诊"),
    entry("心肌炎", "心血管病变", "心肌组织炎症反应", "中", "紧急"),
    entry("胰腺炎", "胰腺病变", "胰腺组织炎症，水肿坏死", "中", "紧急"),
];

/// 病理类型目录
#[derive(Debug, Clone)]
pub struct PathologyCatalog {
    by_label: HashMap<&'static str, &'static PathologyEntry>,
}

impl Default for PathologyCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PathologyCatalog {
    pub fn new() -> Self {
        let by_label = ENTRIES.iter().map(|e| (e.label, e)).collect();
        Self { by_label }
    }

    /// 全部已知类型, 按训练时的类别顺序
    pub fn entries(&self) -> &'static [PathologyEntry] {
        &ENTRIES
    }

    pub fn lookup(&self, label: &str) -> Option<&'static PathologyEntry> {
        self.by_label.get(label.trim()).copied()
    }

    /// 标签对应的病变类别
    pub fn category_of(&self, label: &str) -> &'static str {
        self.lookup(label)
            .map(|e| e.category)
            .unwrap_or(DEFAULT_CATEGORY)
    }

    /// 去重后的病变类别列表
    pub fn categories(&self) -> Vec<&'static str> {
        let mut categories: Vec<&'static str> = Vec::new();
        for e in ENTRIES.iter() {
            if !categories.contains(&e.category) {
                categories.push(e.category);
            }
        }
        categories
    }

    /// 生成诊断补充信息
    pub fn details_for(&self, label: &str, confidence: f64) -> DiagnosisDetails {
        let (description, severity, urgency) = match self.lookup(label) {
            Some(e) => (e.description, e.severity, e.urgency),
            None => (UNKNOWN_DESCRIPTION, UNKNOWN_SEVERITY, UNKNOWN_URGENCY),
        };

        DiagnosisDetails {
            description: description.to_string(),
            severity: severity.to_string(),
            urgency: urgency.to_string(),
            confidence_level: confidence_level(confidence).to_string(),
            reliability: reliability(confidence).to_string(),
        }
    }
}

/// 置信度等级
pub fn confidence_level(confidence: f64) -> &'static str {
    if confidence >= 0.9 {
        "非常高"
    } else if confidence >= 0.7 {
        "高"
    } else if confidence >= 0.5 {
        "中等"
    } else {
        "低"
    }
}

/// 结果可靠性
pub fn reliability(confidence: f64) -> &'static str {
    if confidence >= 0.8 {
        "可靠"
    } else if confidence >= 0.6 {
        "较可靠"
    } else {
        "需人工确认"
    }
}
