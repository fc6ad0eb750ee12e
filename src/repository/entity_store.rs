// ==========================================
// 小额信贷平台 - 目标实体数据访问（事务内）
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 5. 落库策略
// 职责: member_user / loan / contribution 的事务内 CRUD
// 红线: 所有函数只接受 &Transaction，不自行开启/提交事务
// ==========================================

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};
use std::collections::HashMap;

/// 事务内按邮箱查找成员，返回记录 ID
pub fn find_user_by_email(tx: &Transaction, email: &str) -> rusqlite::Result<Option<String>> {
    tx.query_row(
        "SELECT id FROM member_user WHERE email = ?1 COLLATE NOCASE",
        params![email],
        |row| row.get(0),
    )
    .optional()
}

/// 事务内新建成员（激活状态为 PENDING_ACTIVATION，密码为占位符）
pub fn create_user(
    tx: &Transaction,
    id: &str,
    email: &str,
    fields: &HashMap<String, String>,
) -> rusqlite::Result<()> {
    let now = Utc::now();
    tx.execute(
        r#"
        INSERT INTO member_user (
            id, email, first_name, last_name, phone, address, city, postal_code,
            password_hash, activation_state, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'PENDING_ACTIVATION', ?10, ?10)
        "#,
        params![
            id,
            email,
            fields.get("firstName"),
            fields.get("lastName"),
            fields.get("phone"),
            fields.get("address"),
            fields.get("city"),
            fields.get("postalCode"),
            // 导入账号不可直接登录，首次激活时重置
            "IMPORT_PLACEHOLDER",
            now,
        ],
    )?;
    Ok(())
}

/// 事务内更新成员（仅覆盖映射提供的非空字段）
pub fn update_user(
    tx: &Transaction,
    id: &str,
    fields: &HashMap<String, String>,
) -> rusqlite::Result<()> {
    let now = Utc::now();
    tx.execute(
        r#"
        UPDATE member_user SET
            first_name  = COALESCE(?2, first_name),
            last_name   = COALESCE(?3, last_name),
            phone       = COALESCE(?4, phone),
            address     = COALESCE(?5, address),
            city        = COALESCE(?6, city),
            postal_code = COALESCE(?7, postal_code),
            updated_at  = ?8
        WHERE id = ?1
        "#,
        params![
            id,
            non_empty(fields.get("firstName")),
            non_empty(fields.get("lastName")),
            non_empty(fields.get("phone")),
            non_empty(fields.get("address")),
            non_empty(fields.get("city")),
            non_empty(fields.get("postalCode")),
            now,
        ],
    )?;
    Ok(())
}

pub fn delete_user_by_id(tx: &Transaction, id: &str) -> rusqlite::Result<usize> {
    tx.execute("DELETE FROM member_user WHERE id = ?1", params![id])
}

/// 事务内按贷款编号查找贷款
pub fn find_loan_by_number(tx: &Transaction, loan_number: &str) -> rusqlite::Result<Option<String>> {
    tx.query_row(
        "SELECT id FROM loan WHERE loan_number = ?1",
        params![loan_number],
        |row| row.get(0),
    )
    .optional()
}

pub fn create_loan(
    tx: &Transaction,
    id: &str,
    loan_number: &str,
    borrower_id: &str,
    fields: &HashMap<String, String>,
) -> rusqlite::Result<()> {
    let now = Utc::now();
    tx.execute(
        r#"
        INSERT INTO loan (
            id, loan_number, borrower_id, amount, interest_rate, duration_months,
            purpose, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'PENDING', ?8, ?8)
        "#,
        params![
            id,
            loan_number,
            borrower_id,
            parse_f64(fields.get("amount")),
            parse_f64(fields.get("interestRate")),
            parse_i64(fields.get("durationMonths")),
            fields.get("purpose"),
            now,
        ],
    )?;
    Ok(())
}

pub fn update_loan(
    tx: &Transaction,
    id: &str,
    fields: &HashMap<String, String>,
) -> rusqlite::Result<()> {
    let now = Utc::now();
    tx.execute(
        r#"
        UPDATE loan SET
            amount          = COALESCE(?2, amount),
            interest_rate   = COALESCE(?3, interest_rate),
            duration_months = COALESCE(?4, duration_months),
            purpose         = COALESCE(?5, purpose),
            updated_at      = ?6
        WHERE id = ?1
        "#,
        params![
            id,
            parse_f64(fields.get("amount")),
            parse_f64(fields.get("interestRate")),
            parse_i64(fields.get("durationMonths")),
            non_empty(fields.get("purpose")),
            now,
        ],
    )?;
    Ok(())
}

pub fn delete_loan_by_id(tx: &Transaction, id: &str) -> rusqlite::Result<usize> {
    tx.execute("DELETE FROM loan WHERE id = ?1", params![id])
}

/// 事务内按缴款编号查找缴款记录
pub fn find_contribution_by_reference(
    tx: &Transaction,
    reference: &str,
) -> rusqlite::Result<Option<String>> {
    tx.query_row(
        "SELECT id FROM contribution WHERE reference = ?1",
        params![reference],
        |row| row.get(0),
    )
    .optional()
}

pub fn create_contribution(
    tx: &Transaction,
    id: &str,
    reference: &str,
    member_id: &str,
    fields: &HashMap<String, String>,
) -> rusqlite::Result<()> {
    let now = Utc::now();
    tx.execute(
        r#"
        INSERT INTO contribution (
            id, reference, member_id, amount, contribution_date, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
        params![
            id,
            reference,
            member_id,
            parse_f64(fields.get("amount")),
            fields.get("contributionDate"),
            now,
        ],
    )?;
    Ok(())
}

pub fn update_contribution(
    tx: &Transaction,
    id: &str,
    fields: &HashMap<String, String>,
) -> rusqlite::Result<()> {
    let now = Utc::now();
    tx.execute(
        r#"
        UPDATE contribution SET
            amount            = COALESCE(?2, amount),
            contribution_date = COALESCE(?3, contribution_date),
            updated_at        = ?4
        WHERE id = ?1
        "#,
        params![
            id,
            parse_f64(fields.get("amount")),
            non_empty(fields.get("contributionDate")),
            now,
        ],
    )?;
    Ok(())
}

pub fn delete_contribution_by_id(tx: &Transaction, id: &str) -> rusqlite::Result<usize> {
    tx.execute("DELETE FROM contribution WHERE id = ?1", params![id])
}

fn non_empty(v: Option<&String>) -> Option<&String> {
    v.filter(|s| !s.trim().is_empty())
}

fn parse_f64(v: Option<&String>) -> Option<f64> {
    v.and_then(|s| s.trim().parse().ok())
}

fn parse_i64(v: Option<&String>) -> Option<i64> {
    // durationMonths 等整数列可能经过 number 转换得到 "12" 或带小数的 "12.0"
    v.and_then(|s| {
        let t = s.trim();
        t.parse::<i64>()
            .ok()
            .or_else(|| t.parse::<f64>().ok().map(|f| f as i64))
    })
}
