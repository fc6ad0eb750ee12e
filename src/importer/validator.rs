// ==========================================
// 小额信贷平台 - 数据校验引擎
// ==========================================
// 依据: Validation_Rules_v1.0.md - 按导入类型的规则集
// 职责: 映射后记录的逐字段校验 + 修复建议 + 批次内查重
// 红线: 引擎只产出建议，绝不修改源数据
// ==========================================

use crate::domain::session::{FieldMapping, ValidationFinding, ValidationOptions};
use crate::domain::types::{DuplicateHandling, ImportType, Severity};
use crate::importer::field_mapper::{parse_boolean, parse_date, MappedRecord};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

// ==========================================
// 规则定义
// ==========================================

/// 字段值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Email,
    Phone,
    Date,
    Boolean,
}

/// 自定义校验钩子: (值, 整行记录) → Err(消息) 表示不通过
pub type CustomValidator = fn(&str, &MappedRecord) -> Result<(), String>;

/// 单字段校验规则
pub struct FieldRule {
    pub field: String,
    pub required: bool,
    pub field_type: FieldType,
    pub min: Option<f64>, // 数值下界；文本类型时为最小长度
    pub max: Option<f64>, // 数值上界；文本类型时为最大长度（超出仅告警）
    pub pattern: Option<Regex>,
    pub unique: bool, // 批次内唯一
    pub custom: Option<CustomValidator>,
}

impl FieldRule {
    fn new(field: &str, field_type: FieldType) -> Self {
        Self {
            field: field.to_string(),
            required: false,
            field_type,
            min: None,
            max: None,
            pattern: None,
            unique: false,
            custom: None,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn min(mut self, v: f64) -> Self {
        self.min = Some(v);
        self
    }

    fn max(mut self, v: f64) -> Self {
        self.max = Some(v);
        self
    }

    fn pattern(mut self, re: &str) -> Self {
        // 内置规则集的正则为常量，编译失败属于编程错误
        self.pattern = Regex::new(re).ok();
        self
    }

    fn custom(mut self, f: CustomValidator) -> Self {
        self.custom = Some(f);
        self
    }
}

/// 导入类型对应的规则集
pub struct RuleSet {
    pub rules: Vec<FieldRule>,
}

impl RuleSet {
    /// 内置规则集（按导入类型解析）
    pub fn for_import_type(import_type: ImportType) -> RuleSet {
        let rules = match import_type {
            ImportType::Users => vec![
                FieldRule::new("email", FieldType::Email).required().unique(),
                FieldRule::new("firstName", FieldType::Text).required().max(50.0),
                FieldRule::new("lastName", FieldType::Text).required().max(50.0),
                FieldRule::new("phone", FieldType::Phone),
                FieldRule::new("address", FieldType::Text).max(200.0),
                FieldRule::new("city", FieldType::Text).max(100.0),
                FieldRule::new("postalCode", FieldType::Text)
                    .pattern(r"^[0-9A-Za-z][0-9A-Za-z -]{1,9}$"),
            ],
            ImportType::Loans => vec![
                FieldRule::new("loanNumber", FieldType::Text).required().unique().max(30.0),
                FieldRule::new("borrowerEmail", FieldType::Email).required(),
                FieldRule::new("amount", FieldType::Number).required().min(1.0),
                FieldRule::new("interestRate", FieldType::Number).min(0.0).max(100.0),
                FieldRule::new("durationMonths", FieldType::Number).min(1.0).max(360.0),
                FieldRule::new("purpose", FieldType::Text).max(200.0),
            ],
            ImportType::Contributions => vec![
                FieldRule::new("reference", FieldType::Text).required().unique().max(40.0),
                FieldRule::new("memberEmail", FieldType::Email).required(),
                FieldRule::new("amount", FieldType::Number).required().min(1.0),
                FieldRule::new("contributionDate", FieldType::Date)
                    .custom(validate_not_future_date),
            ],
            ImportType::Guarantees => vec![
                FieldRule::new("guarantorEmail", FieldType::Email).required(),
                FieldRule::new("loanNumber", FieldType::Text).required(),
                FieldRule::new("amount", FieldType::Number).min(0.0),
            ],
            ImportType::Payments => vec![
                FieldRule::new("loanNumber", FieldType::Text).required(),
                FieldRule::new("amount", FieldType::Number).required().min(1.0),
                FieldRule::new("paymentDate", FieldType::Date),
            ],
        };

        RuleSet { rules }
    }
}

/// 自定义规则: 缴款日期不得晚于当天
fn validate_not_future_date(value: &str, _row: &MappedRecord) -> Result<(), String> {
    if value.is_empty() {
        return Ok(());
    }
    if let Some(date) = parse_date(value, None) {
        let today = chrono::Local::now().date_naive();
        if date > today {
            return Err(format!("缴款日期晚于当天: {}", date));
        }
    }
    Ok(())
}

// ==========================================
// 校验结果汇总
// ==========================================

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub findings: Vec<ValidationFinding>,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    /// 带可自动修复建议的条目数（引擎只建议，应用与否由调用方决定）
    pub auto_fixable_count: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }
}

// ==========================================
// ValidationEngine - 校验引擎
// ==========================================
pub struct ValidationEngine {
    email_re: Regex,
    phone_re: Regex,
}

/// 邮箱域名纠错候选表（编辑距离 ≤ 2 时给出建议）
const COMMON_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "yahoo.fr",
    "hotmail.com",
    "outlook.com",
    "orange.fr",
    "free.fr",
];

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self {
            // 基础格式判定，不追求 RFC 完备
            email_re: Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
                .expect("email 正则为常量"),
            // 去除格式符后的号码: 可选 + 前缀，7-15 位数字
            phone_re: Regex::new(r"^\+?[0-9]{7,15}$").expect("phone 正则为常量"),
        }
    }

    /// 对整批映射记录执行校验
    ///
    /// # 参数
    /// - session_id: 归属会话（写入每条 finding）
    /// - records: 映射后的记录（与源文件行序一致）
    /// - mapping: 列映射（用于在 finding 中回填源列名）
    /// - rule_set: 导入类型对应的规则集
    /// - opts: 会话级校验选项
    pub fn validate(
        &self,
        session_id: &str,
        records: &[MappedRecord],
        mapping: &[FieldMapping],
        rule_set: &RuleSet,
        opts: &ValidationOptions,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        // 字段名 → 源列名（finding 定位用）
        let column_of: HashMap<&str, &str> = mapping
            .iter()
            .map(|m| (m.field_name.as_str(), m.column_name.as_str()))
            .collect();

        // 批次内唯一性: 每个 unique 字段一个集合，跨全文件累积
        let mut seen: HashMap<&str, HashSet<String>> = rule_set
            .rules
            .iter()
            .filter(|r| r.unique)
            .map(|r| (r.field.as_str(), HashSet::new()))
            .collect();

        for (idx, record) in records.iter().enumerate() {
            let row_number = (idx + 1) as i64;

            for rule in &rule_set.rules {
                let value = record
                    .get(&rule.field)
                    .map(|v| v.trim())
                    .unwrap_or("");
                let column_name = column_of.get(rule.field.as_str()).map(|c| c.to_string());

                // (1) 必填检查 —— 为空时短路该字段的后续检查
                if value.is_empty() {
                    if rule.required {
                        report.push(finding(
                            session_id,
                            row_number,
                            column_name,
                            &rule.field,
                            Severity::Error,
                            "REQUIRED_FIELD",
                            format!("必填字段为空: {}", rule.field),
                            None,
                            None,
                        ));
                    }
                    continue;
                }

                // (2) 类型检查
                if let Some(f) = self.check_type(session_id, row_number, &column_name, rule, value)
                {
                    let fatal = f.severity == Severity::Error;
                    report.push(f);
                    if fatal {
                        // 类型不合法时后续检查无意义
                        continue;
                    }
                }

                // (3) 正则检查
                if let Some(re) = &rule.pattern {
                    if !re.is_match(value) {
                        report.push(finding(
                            session_id,
                            row_number,
                            column_name.clone(),
                            &rule.field,
                            Severity::Error,
                            "PATTERN_MISMATCH",
                            format!("字段 {} 不符合格式要求", rule.field),
                            Some(re.as_str().to_string()),
                            Some(value.to_string()),
                        ));
                    }
                }

                // (4) 文本长度上界 —— 仅告警 + 截断建议
                if rule.field_type == FieldType::Text {
                    if let Some(max) = rule.max {
                        let max_len = max as usize;
                        if value.chars().count() > max_len {
                            let truncated: String = value.chars().take(max_len).collect();
                            let mut f = finding(
                                session_id,
                                row_number,
                                column_name.clone(),
                                &rule.field,
                                Severity::Warning,
                                "VALUE_TOO_LONG",
                                format!(
                                    "字段 {} 超出最大长度 {}（实际 {}）",
                                    rule.field,
                                    max_len,
                                    value.chars().count()
                                ),
                                Some(format!("≤ {} 字符", max_len)),
                                Some(value.to_string()),
                            );
                            f.suggested_fix = Some(truncated);
                            f.can_auto_fix = true;
                            report.push(f);
                        }
                    }
                }

                // (5) 批次内唯一性 —— 首次出现放行，第二次起标记
                if rule.unique {
                    let normalized = value.to_lowercase();
                    let set = seen.get_mut(rule.field.as_str()).expect("集合已预建");
                    if !set.insert(normalized) {
                        let severity = match opts.duplicate_handling {
                            DuplicateHandling::Reject => Severity::Error,
                            DuplicateHandling::Warn | DuplicateHandling::Skip => Severity::Warning,
                        };
                        report.push(finding(
                            session_id,
                            row_number,
                            column_name.clone(),
                            &rule.field,
                            severity,
                            "DUPLICATE_VALUE",
                            format!("字段 {} 在批次内重复: {}", rule.field, value),
                            None,
                            Some(value.to_string()),
                        ));
                    }
                }

                // (6) 自定义校验钩子
                if let Some(custom) = rule.custom {
                    if let Err(message) = custom(value, record) {
                        report.push(finding(
                            session_id,
                            row_number,
                            column_name,
                            &rule.field,
                            Severity::Error,
                            "CUSTOM_RULE",
                            message,
                            None,
                            Some(value.to_string()),
                        ));
                    }
                }
            }
        }

        report
    }

    /// 跨库查重（扩展点）
    ///
    /// 基础实现不查询目标库；接入方可在此比对既有数据
    /// （如邮箱已存在于 member_user 表）后追加 finding。
    pub fn check_against_store(
        &self,
        _records: &[MappedRecord],
        _rule_set: &RuleSet,
    ) -> Vec<ValidationFinding> {
        Vec::new()
    }

    /// 类型检查（按类型定制诊断与修复建议）
    #[allow(clippy::too_many_arguments)]
    fn check_type(
        &self,
        session_id: &str,
        row_number: i64,
        column_name: &Option<String>,
        rule: &FieldRule,
        value: &str,
    ) -> Option<ValidationFinding> {
        match rule.field_type {
            FieldType::Text => None,
            FieldType::Email => self.check_email(session_id, row_number, column_name, rule, value),
            FieldType::Phone => self.check_phone(session_id, row_number, column_name, rule, value),
            FieldType::Number => self.check_number(session_id, row_number, column_name, rule, value),
            FieldType::Date => self.check_date(session_id, row_number, column_name, rule, value),
            FieldType::Boolean => {
                if parse_boolean(value).is_none() {
                    Some(finding(
                        session_id,
                        row_number,
                        column_name.clone(),
                        &rule.field,
                        Severity::Error,
                        "INVALID_BOOLEAN",
                        format!("无法解析为布尔值: {}", value),
                        Some("true/false、1/0、yes/no、oui/non".to_string()),
                        Some(value.to_string()),
                    ))
                } else {
                    None
                }
            }
        }
    }

    fn check_email(
        &self,
        session_id: &str,
        row_number: i64,
        column_name: &Option<String>,
        rule: &FieldRule,
        value: &str,
    ) -> Option<ValidationFinding> {
        if self.email_re.is_match(value) {
            return None;
        }

        let mut f = finding(
            session_id,
            row_number,
            column_name.clone(),
            &rule.field,
            Severity::Error,
            "INVALID_EMAIL",
            format!("邮箱格式无效: {}", value),
            None,
            Some(value.to_string()),
        );

        // 域名近似纠错: 常见域名编辑距离 ≤ 2 时给出修复建议
        if let Some((local, domain)) = value.split_once('@') {
            if !local.is_empty() {
                let lowered = domain.to_lowercase();
                let candidate = COMMON_EMAIL_DOMAINS
                    .iter()
                    .map(|d| (*d, edit_distance(&lowered, d)))
                    .filter(|(_, dist)| *dist > 0 && *dist <= 2)
                    .min_by_key(|(_, dist)| *dist);

                if let Some((fixed_domain, _)) = candidate {
                    f.suggested_fix = Some(format!("{}@{}", local, fixed_domain));
                    f.can_auto_fix = true;
                }
            }
        }

        Some(f)
    }

    fn check_phone(
        &self,
        session_id: &str,
        row_number: i64,
        column_name: &Option<String>,
        rule: &FieldRule,
        value: &str,
    ) -> Option<ValidationFinding> {
        // 去格式符标准化: 保留前导 +，去掉空格/横线/括号/点
        let normalized = normalize_phone(value);

        if !self.phone_re.is_match(&normalized) {
            return Some(finding(
                session_id,
                row_number,
                column_name.clone(),
                &rule.field,
                Severity::Error,
                "INVALID_PHONE",
                format!("电话号码不合理: {}", value),
                Some("7-15 位数字，可带 + 前缀".to_string()),
                Some(value.to_string()),
            ));
        }

        // 原值含格式符时给出标准化建议（可自动修复，不阻断）
        if normalized != value {
            let mut f = finding(
                session_id,
                row_number,
                column_name.clone(),
                &rule.field,
                Severity::Info,
                "PHONE_FORMAT",
                format!("电话号码含格式符: {}", value),
                None,
                Some(value.to_string()),
            );
            f.suggested_fix = Some(normalized);
            f.can_auto_fix = true;
            return Some(f);
        }

        None
    }

    fn check_number(
        &self,
        session_id: &str,
        row_number: i64,
        column_name: &Option<String>,
        rule: &FieldRule,
        value: &str,
    ) -> Option<ValidationFinding> {
        let Ok(n) = value.parse::<f64>() else {
            return Some(finding(
                session_id,
                row_number,
                column_name.clone(),
                &rule.field,
                Severity::Error,
                "INVALID_NUMBER",
                format!("无法解析为数值: {}", value),
                None,
                Some(value.to_string()),
            ));
        };

        if let Some(min) = rule.min {
            if n < min {
                return Some(finding(
                    session_id,
                    row_number,
                    column_name.clone(),
                    &rule.field,
                    Severity::Error,
                    "NUMBER_OUT_OF_RANGE",
                    format!("字段 {} 低于下界: {} < {}", rule.field, n, min),
                    Some(format!("≥ {}", min)),
                    Some(value.to_string()),
                ));
            }
        }
        if let Some(max) = rule.max {
            if n > max {
                return Some(finding(
                    session_id,
                    row_number,
                    column_name.clone(),
                    &rule.field,
                    Severity::Error,
                    "NUMBER_OUT_OF_RANGE",
                    format!("字段 {} 超出上界: {} > {}", rule.field, n, max),
                    Some(format!("≤ {}", max)),
                    Some(value.to_string()),
                ));
            }
        }

        None
    }

    fn check_date(
        &self,
        session_id: &str,
        row_number: i64,
        column_name: &Option<String>,
        rule: &FieldRule,
        value: &str,
    ) -> Option<ValidationFinding> {
        // ISO 优先
        if chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
            return None;
        }

        let mut f = finding(
            session_id,
            row_number,
            column_name.clone(),
            &rule.field,
            Severity::Error,
            "INVALID_DATE",
            format!("日期格式无效: {}（期望 YYYY-MM-DD）", value),
            Some("YYYY-MM-DD".to_string()),
            Some(value.to_string()),
        );

        // 常见格式猜测，可恢复时给出 ISO 建议
        for fmt in ["%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y"] {
            if let Ok(d) = chrono::NaiveDate::parse_from_str(value, fmt) {
                f.suggested_fix = Some(d.format("%Y-%m-%d").to_string());
                f.can_auto_fix = true;
                break;
            }
        }

        Some(f)
    }
}

impl ValidationReport {
    fn push(&mut self, f: ValidationFinding) {
        match f.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Info => self.info_count += 1,
        }
        if f.can_auto_fix {
            self.auto_fixable_count += 1;
        }
        self.findings.push(f);
    }
}

/// 构造 finding（统一默认字段）
#[allow(clippy::too_many_arguments)]
fn finding(
    session_id: &str,
    row_number: i64,
    column_name: Option<String>,
    field_name: &str,
    severity: Severity,
    error_code: &str,
    message: String,
    expected_value: Option<String>,
    actual_value: Option<String>,
) -> ValidationFinding {
    ValidationFinding {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        row_number,
        column_name,
        field_name: Some(field_name.to_string()),
        severity,
        error_code: error_code.to_string(),
        message,
        expected_value,
        actual_value,
        suggested_fix: None,
        can_auto_fix: false,
        was_auto_fixed: false,
    }
}

/// 电话号码标准化: 保留前导 +，其余仅保留数字
pub fn normalize_phone(value: &str) -> String {
    let trimmed = value.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c == '+' && i == 0 {
            out.push(c);
        } else if c.is_ascii_digit() {
            out.push(c);
        }
    }
    out
}

/// 编辑距离（Levenshtein，域名纠错用）
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{FieldMapping, ValidationOptions};

    fn mapping_for(fields: &[(&str, &str)]) -> Vec<FieldMapping> {
        fields
            .iter()
            .map(|(col, field)| FieldMapping {
                column_name: col.to_string(),
                field_name: field.to_string(),
                transform: None,
                default_value: None,
                required: false,
            })
            .collect()
    }

    fn record(fields: &[(&str, &str)]) -> MappedRecord {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn users_mapping() -> Vec<FieldMapping> {
        mapping_for(&[
            ("Email", "email"),
            ("First Name", "firstName"),
            ("Last Name", "lastName"),
        ])
    }

    #[test]
    fn test_required_field_short_circuits() {
        let engine = ValidationEngine::new();
        let records = vec![record(&[("email", ""), ("firstName", "A"), ("lastName", "B")])];

        let report = engine.validate(
            "s1",
            &records,
            &users_mapping(),
            &RuleSet::for_import_type(ImportType::Users),
            &ValidationOptions::default(),
        );

        // 空值只产出 REQUIRED_FIELD，不再叠加 INVALID_EMAIL
        let email_findings: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.field_name.as_deref() == Some("email"))
            .collect();
        assert_eq!(email_findings.len(), 1);
        assert_eq!(email_findings[0].error_code, "REQUIRED_FIELD");
    }

    #[test]
    fn test_duplicate_email_flagged_on_second_row_only() {
        let engine = ValidationEngine::new();
        let records = vec![
            record(&[("email", "a@x.com"), ("firstName", "A"), ("lastName", "One")]),
            record(&[("email", "a@x.com"), ("firstName", "A"), ("lastName", "Two")]),
        ];

        let report = engine.validate(
            "s1",
            &records,
            &users_mapping(),
            &RuleSet::for_import_type(ImportType::Users),
            &ValidationOptions::default(),
        );

        let dups: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.error_code == "DUPLICATE_VALUE")
            .collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].row_number, 2);
        assert_eq!(dups[0].column_name.as_deref(), Some("Email"));
        assert_eq!(dups[0].severity, Severity::Error);
    }

    #[test]
    fn test_duplicate_handling_warn_downgrades_severity() {
        let engine = ValidationEngine::new();
        let records = vec![
            record(&[("email", "a@x.com"), ("firstName", "A"), ("lastName", "1")]),
            record(&[("email", "a@x.com"), ("firstName", "A"), ("lastName", "2")]),
        ];
        let opts = ValidationOptions {
            duplicate_handling: DuplicateHandling::Warn,
            check_existing: false,
        };

        let report = engine.validate(
            "s1",
            &records,
            &users_mapping(),
            &RuleSet::for_import_type(ImportType::Users),
            &opts,
        );

        let dup = report
            .findings
            .iter()
            .find(|f| f.error_code == "DUPLICATE_VALUE")
            .unwrap();
        assert_eq!(dup.severity, Severity::Warning);
        assert!(report.is_valid());
    }

    #[test]
    fn test_email_typo_domain_suggestion() {
        let engine = ValidationEngine::new();
        let records = vec![record(&[
            ("email", "alice@gmail,com"),
            ("firstName", "Alice"),
            ("lastName", "One"),
        ])];

        let report = engine.validate(
            "s1",
            &records,
            &users_mapping(),
            &RuleSet::for_import_type(ImportType::Users),
            &ValidationOptions::default(),
        );

        let f = report
            .findings
            .iter()
            .find(|f| f.error_code == "INVALID_EMAIL")
            .unwrap();
        assert_eq!(f.suggested_fix.as_deref(), Some("alice@gmail.com"));
        assert!(f.can_auto_fix);
    }

    #[test]
    fn test_phone_normalization_is_info_not_error() {
        let engine = ValidationEngine::new();
        let records = vec![record(&[
            ("email", "a@x.com"),
            ("firstName", "A"),
            ("lastName", "B"),
            ("phone", "+221 77 123-45-67"),
        ])];

        let report = engine.validate(
            "s1",
            &records,
            &users_mapping(),
            &RuleSet::for_import_type(ImportType::Users),
            &ValidationOptions::default(),
        );

        assert!(report.is_valid());
        let f = report
            .findings
            .iter()
            .find(|f| f.error_code == "PHONE_FORMAT")
            .unwrap();
        assert_eq!(f.suggested_fix.as_deref(), Some("+221771234567"));
        assert!(f.can_auto_fix);
    }

    #[test]
    fn test_number_bounds() {
        let engine = ValidationEngine::new();
        let mapping = mapping_for(&[
            ("Loan No", "loanNumber"),
            ("Borrower", "borrowerEmail"),
            ("Amount", "amount"),
        ]);
        let records = vec![record(&[
            ("loanNumber", "L-001"),
            ("borrowerEmail", "a@x.com"),
            ("amount", "0"),
        ])];

        let report = engine.validate(
            "s1",
            &records,
            &mapping,
            &RuleSet::for_import_type(ImportType::Loans),
            &ValidationOptions::default(),
        );

        assert!(report
            .findings
            .iter()
            .any(|f| f.error_code == "NUMBER_OUT_OF_RANGE" && f.row_number == 1));
    }

    #[test]
    fn test_date_guess_produces_iso_suggestion() {
        let engine = ValidationEngine::new();
        let mapping = mapping_for(&[
            ("Ref", "reference"),
            ("Member", "memberEmail"),
            ("Amount", "amount"),
            ("Date", "contributionDate"),
        ]);
        let records = vec![record(&[
            ("reference", "C-1"),
            ("memberEmail", "a@x.com"),
            ("amount", "100"),
            ("contributionDate", "01/15/2020"),
        ])];

        let report = engine.validate(
            "s1",
            &records,
            &mapping,
            &RuleSet::for_import_type(ImportType::Contributions),
            &ValidationOptions::default(),
        );

        let f = report
            .findings
            .iter()
            .find(|f| f.error_code == "INVALID_DATE")
            .unwrap();
        assert_eq!(f.suggested_fix.as_deref(), Some("2020-01-15"));
        assert!(f.can_auto_fix);
    }

    #[test]
    fn test_text_too_long_is_warning_with_truncation() {
        let engine = ValidationEngine::new();
        let long_name = "x".repeat(60);
        let records = vec![record(&[
            ("email", "a@x.com"),
            ("firstName", long_name.as_str()),
            ("lastName", "B"),
        ])];

        let report = engine.validate(
            "s1",
            &records,
            &users_mapping(),
            &RuleSet::for_import_type(ImportType::Users),
            &ValidationOptions::default(),
        );

        assert!(report.is_valid()); // 超长仅告警
        let f = report
            .findings
            .iter()
            .find(|f| f.error_code == "VALUE_TOO_LONG")
            .unwrap();
        assert_eq!(f.severity, Severity::Warning);
        assert_eq!(f.suggested_fix.as_deref().map(|s| s.len()), Some(50));
    }

    #[test]
    fn test_revalidation_is_deterministic() {
        let engine = ValidationEngine::new();
        let records = vec![
            record(&[("email", "bad-email"), ("firstName", "A"), ("lastName", "1")]),
            record(&[("email", "b@x.com"), ("firstName", ""), ("lastName", "2")]),
        ];
        let mapping = users_mapping();
        let rules = RuleSet::for_import_type(ImportType::Users);
        let opts = ValidationOptions::default();

        let r1 = engine.validate("s1", &records, &mapping, &rules, &opts);
        let r2 = engine.validate("s1", &records, &mapping, &rules, &opts);

        assert_eq!(r1.findings.len(), r2.findings.len());
        for (a, b) in r1.findings.iter().zip(r2.findings.iter()) {
            assert_eq!(a.row_number, b.row_number);
            assert_eq!(a.error_code, b.error_code);
            assert_eq!(a.field_name, b.field_name);
            assert_eq!(a.severity, b.severity);
        }
    }

    #[test]
    fn test_custom_rule_future_contribution_date() {
        let engine = ValidationEngine::new();
        let mapping = mapping_for(&[
            ("Ref", "reference"),
            ("Member", "memberEmail"),
            ("Amount", "amount"),
            ("Date", "contributionDate"),
        ]);
        let future = (chrono::Local::now().date_naive() + chrono::Duration::days(30))
            .format("%Y-%m-%d")
            .to_string();
        let records = vec![record(&[
            ("reference", "C-1"),
            ("memberEmail", "a@x.com"),
            ("amount", "100"),
            ("contributionDate", future.as_str()),
        ])];

        let report = engine.validate(
            "s1",
            &records,
            &mapping,
            &RuleSet::for_import_type(ImportType::Contributions),
            &ValidationOptions::default(),
        );

        assert!(report
            .findings
            .iter()
            .any(|f| f.error_code == "CUSTOM_RULE"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("gmail.com", "gmail.com"), 0);
        assert_eq!(edit_distance("gmial.com", "gmail.com"), 2);
        assert_eq!(edit_distance("abc", ""), 3);
    }
}
