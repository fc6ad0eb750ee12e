// ==========================================
// 小额信贷平台 - 列名映射建议
// ==========================================
// 依据: Field_Mapping_Spec_v1.0.md - 3. 列名同义词表
// 职责: 按列名启发式推荐标准字段（仅建议，不落库）
// ==========================================

use serde::{Deserialize, Serialize};

/// 单列的映射建议
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSuggestion {
    pub column_name: String,
    pub field_name: String, // 无法识别时为 "unmapped"
    pub confidence: u8,     // 精确匹配 100 / 包含匹配 80 / 未识别 0
}

/// 标准字段 → 同义词表（均为小写比较）
///
/// 同义词覆盖英文与法文列名（历史数据多为法文表头）。
const FIELD_SYNONYMS: &[(&str, &[&str])] = &[
    ("email", &["email", "e-mail", "mail", "courriel", "adresse email"]),
    (
        "firstName",
        &["first name", "firstname", "prenom", "prénom", "given name"],
    ),
    (
        "lastName",
        &["last name", "lastname", "nom", "surname", "family name", "nom de famille"],
    ),
    ("phone", &["phone", "telephone", "téléphone", "tel", "mobile", "phone number"]),
    ("address", &["address", "adresse", "street", "rue"]),
    ("city", &["city", "ville", "town"]),
    ("postalCode", &["postal code", "postalcode", "zip", "zip code", "code postal"]),
    ("amount", &["amount", "montant", "sum", "somme", "total"]),
];

/// 为一组列名生成映射建议
pub fn suggest_mapping(columns: &[String]) -> Vec<ColumnSuggestion> {
    columns.iter().map(|c| suggest_column(c)).collect()
}

/// 单列建议：标准化后先精确匹配，再做包含匹配
fn suggest_column(column_name: &str) -> ColumnSuggestion {
    let normalized = column_name.trim().to_lowercase();

    // 精确匹配
    for (field, synonyms) in FIELD_SYNONYMS {
        if synonyms.iter().any(|s| *s == normalized) {
            return ColumnSuggestion {
                column_name: column_name.to_string(),
                field_name: (*field).to_string(),
                confidence: 100,
            };
        }
    }

    // 包含匹配（列名含同义词或同义词含列名）
    for (field, synonyms) in FIELD_SYNONYMS {
        if synonyms
            .iter()
            .any(|s| normalized.contains(s) || (!normalized.is_empty() && s.contains(normalized.as_str())))
        {
            return ColumnSuggestion {
                column_name: column_name.to_string(),
                field_name: (*field).to_string(),
                confidence: 80,
            };
        }
    }

    ColumnSuggestion {
        column_name: column_name.to_string(),
        field_name: "unmapped".to_string(),
        confidence: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_full_confidence() {
        let suggestion = suggest_column("Email");
        assert_eq!(suggestion.field_name, "email");
        assert_eq!(suggestion.confidence, 100);
    }

    #[test]
    fn test_exact_match_french_synonym() {
        let suggestion = suggest_column("Prénom");
        assert_eq!(suggestion.field_name, "firstName");
        assert_eq!(suggestion.confidence, 100);
    }

    #[test]
    fn test_substring_match_lower_confidence() {
        let suggestion = suggest_column("Customer Email Address");
        assert_eq!(suggestion.field_name, "email");
        assert_eq!(suggestion.confidence, 80);
    }

    #[test]
    fn test_unknown_column_unmapped() {
        let suggestion = suggest_column("Favorite Color");
        assert_eq!(suggestion.field_name, "unmapped");
        assert_eq!(suggestion.confidence, 0);
    }

    #[test]
    fn test_suggest_mapping_keeps_column_order() {
        let columns = vec![
            "Email".to_string(),
            "Montant".to_string(),
            "X".to_string(),
        ];
        let suggestions = suggest_mapping(&columns);

        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0].field_name, "email");
        assert_eq!(suggestions[1].field_name, "amount");
        assert_eq!(suggestions[2].field_name, "unmapped");
    }
}
