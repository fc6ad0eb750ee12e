// ==========================================
// 小额信贷平台 - 字段映射器
// ==========================================
// 依据: Field_Mapping_Spec_v1.0.md - 4. 映射与转换
// 职责: 源列 → 标准字段映射 + 声明式值转换 + 默认值兜底
// 位置语义: 映射按生成它的列序定位，列序变化使映射失效
// ==========================================

use crate::domain::session::{FieldMapping, FieldTransform};
use crate::domain::types::TransformKind;
use chrono::NaiveDate;
use std::collections::HashMap;

/// 映射后的记录：标准字段名 → 转换后的值
pub type MappedRecord = HashMap<String, String>;

/// 布尔转换接受的令牌集（真值 / 假值）
const TRUE_TOKENS: &[&str] = &["true", "1", "yes", "oui"];
const FALSE_TOKENS: &[&str] = &["false", "0", "no", "non"];

// ==========================================
// FieldMapper - 字段映射器
// ==========================================
// 构造时将列名解析为列索引，逐行应用时纯位置取值
pub struct FieldMapper {
    // (列索引, 映射条目)，列名不存在的条目索引为 None
    resolved: Vec<(Option<usize>, FieldMapping)>,
}

impl FieldMapper {
    /// 针对给定列序构造映射器
    pub fn new(columns: &[String], mapping: &[FieldMapping]) -> Self {
        let resolved = mapping
            .iter()
            .map(|m| {
                let idx = columns.iter().position(|c| c == &m.column_name);
                (idx, m.clone())
            })
            .collect();

        Self { resolved }
    }

    /// 将一行原始值映射为标准记录
    ///
    /// 规则: 取列索引处的值 → 应用转换 → 为空时替换默认值 → 按字段名写入
    pub fn map_row(&self, row: &[String]) -> MappedRecord {
        let mut record = MappedRecord::new();

        for (idx, mapping) in &self.resolved {
            let raw = idx
                .and_then(|i| row.get(i))
                .map(|v| v.as_str())
                .unwrap_or("");

            let mut value = apply_transform(raw, mapping.transform.as_ref());

            if value.is_empty() {
                if let Some(default) = &mapping.default_value {
                    value = default.clone();
                }
            }

            record.insert(mapping.field_name.clone(), value);
        }

        record
    }
}

/// 应用声明式转换；无法转换时保留原值（由校验引擎定性）
fn apply_transform(raw: &str, transform: Option<&FieldTransform>) -> String {
    let trimmed = raw.trim();

    let Some(transform) = transform else {
        return trimmed.to_string();
    };

    match transform.kind {
        TransformKind::Trim => trimmed.to_string(),
        TransformKind::Uppercase => trimmed.to_uppercase(),
        TransformKind::Lowercase => trimmed.to_lowercase(),
        TransformKind::Number => parse_number(trimmed).unwrap_or_else(|| trimmed.to_string()),
        TransformKind::Boolean => parse_boolean(trimmed)
            .map(|b| b.to_string())
            .unwrap_or_else(|| trimmed.to_string()),
        TransformKind::Date => parse_date(trimmed, transform.format.as_deref())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| trimmed.to_string()),
    }
}

/// 数值标准化（去掉千分位空格/逗号混写由调用方保证，仅做基础解析）
fn parse_number(value: &str) -> Option<String> {
    value.parse::<f64>().ok().map(|n| {
        if n.fract() == 0.0 && n.abs() < 1e15 {
            format!("{}", n as i64)
        } else {
            format!("{}", n)
        }
    })
}

/// 布尔解析：true/false、1/0、yes/no、oui/non（大小写不敏感）
pub fn parse_boolean(value: &str) -> Option<bool> {
    let lowered = value.trim().to_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// 日期解析：显式格式优先，否则依次尝试常见格式
pub fn parse_date(value: &str, format: Option<&str>) -> Option<NaiveDate> {
    if let Some(fmt) = format {
        return NaiveDate::parse_from_str(value, fmt).ok();
    }

    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d);
        }
    }
    None
}
