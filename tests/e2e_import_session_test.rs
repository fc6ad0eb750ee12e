// ==========================================
// 端到端集成测试 - 导入会话完整流程
// ==========================================
// 测试目标: 上传 → 预览 → 映射 → 校验 → 落库 → 回退 全链路
// 覆盖范围: ImportSessionApi + ImportJobQueue + BatchRunner
// ==========================================


use microfin_import::domain::session::{FieldMapping, ValidationOptions};
use microfin_import::domain::types::{ImportType, SessionStatus, Severity};
use microfin_import::logging;

fn mapping(entries: &[(&str, &str)]) -> Vec<FieldMapping> {
    entries
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

// ==========================================
// 测试用例 1: 用户导入完整流程（含回退）
// ==========================================
#[tokio::test]
async fn test_e2e_users_import_and_rollback() {
    logging::init_test();
    let stack = test_helpers::create_import_stack().unwrap();

    // 步骤 1: 上传
    let csv = "Email,First Name,Last Name,Phone\n\
               alice@gmail.com,Alice,One,+221771234567\n\
               bob@gmail.com,Bob,Two,\n";
    let session = stack
        .api
        .create_session("admin", "members.csv", ImportType::Users, true, None, csv.as_bytes())
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    assert!(session.session_number.starts_with("IMP-"));

    // 步骤 2: 预览（含映射建议）
    let preview = stack.api.preview("admin", &session.id).await.unwrap();
    assert_eq!(preview.total_rows, 2);
    assert_eq!(preview.columns[0], "Email");
    let email_suggestion = preview
        .suggested_mapping
        .iter()
        .find(|s| s.column_name == "Email")
        .unwrap();
    assert_eq!(email_suggestion.field_name, "email");
    assert_eq!(email_suggestion.confidence, 100);

    // 步骤 3: 列映射
    stack
        .api
        .update_mapping(
            "admin",
            &session.id,
            mapping(&[
                ("Email", "email"),
                ("First Name", "firstName"),
                ("Last Name", "lastName"),
                ("Phone", "phone"),
            ]),
            Some(ValidationOptions::default()),
        )
        .await
        .unwrap();

    // 步骤 4: 校验（无 ERROR）
    let summary = stack.api.validate("admin", &session.id).await.unwrap();
    assert!(summary.is_valid, "校验应通过: {:?}", summary.findings);
    assert_eq!(summary.error_count, 0);

    // 步骤 5: 启动落库并执行任务
    let accepted = stack.api.start_import("admin", &session.id).await.unwrap();
    assert_eq!(accepted.session_id, session.id);
    let processed = stack.runner.process_next().await.unwrap();
    assert!(processed);

    let done = stack.api.get_session("admin", &session.id).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.total_rows, 2);
    assert_eq!(done.success_rows, 2);
    assert_eq!(done.failed_rows, 0);
    assert!(done.can_rollback);
    assert!(done.processing_time_ms.is_some());
    assert_eq!(done.rollback_data.as_ref().unwrap().ids().len(), 2);
    assert_eq!(test_helpers::count_rows(&stack.db_path, "member_user"), 2);

    // 进度: 完成后为 100%
    let progress = stack.api.progress("admin", &session.id).await.unwrap();
    assert_eq!(progress.percentage, 100);

    // 步骤 6: 回退（仅删除新建记录）
    stack.api.rollback("admin", &session.id).await.unwrap();
    let processed = stack.runner.process_next().await.unwrap();
    assert!(processed);

    let rolled = stack.api.get_session("admin", &session.id).await.unwrap();
    assert!(rolled.rolled_back_at.is_some());
    assert_eq!(rolled.rolled_back_by.as_deref(), Some("admin"));
    assert!(!rolled.can_rollback);
    assert_eq!(test_helpers::count_rows(&stack.db_path, "member_user"), 0);

    // 二次回退被拒绝
    assert!(stack.api.rollback("admin", &session.id).await.is_err());
}

// ==========================================
// 测试用例 2: 批次内重复邮箱阻断启动
// ==========================================
#[tokio::test]
async fn test_duplicate_email_blocks_start() {
    let stack = test_helpers::create_import_stack().unwrap();

    let csv = "Email,First Name,Last Name\n\
               a@x.com,A,One\n\
               a@x.com,A,Two\n";
    let session = stack
        .api
        .create_session("admin", "dup.csv", ImportType::Users, true, None, csv.as_bytes())
        .await
        .unwrap();
    stack
        .api
        .update_mapping(
            "admin",
            &session.id,
            mapping(&[
                ("Email", "email"),
                ("First Name", "firstName"),
                ("Last Name", "lastName"),
            ]),
            None,
        )
        .await
        .unwrap();

    let summary = stack.api.validate("admin", &session.id).await.unwrap();
    assert!(!summary.is_valid);

    // 第二次出现处标记，首个不标记
    let dups: Vec<_> = summary
        .findings
        .iter()
        .filter(|f| f.error_code == "DUPLICATE_VALUE")
        .collect();
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].row_number, 2);
    assert_eq!(dups[0].column_name.as_deref(), Some("Email"));
    assert_eq!(dups[0].severity, Severity::Error);

    // ERROR 存在时禁止启动
    let err = stack.api.start_import("admin", &session.id).await;
    assert!(err.is_err());
}

// ==========================================
// 测试用例 3: 贷款导入 - 未知借款人行级失败
// ==========================================
#[tokio::test]
async fn test_loans_unknown_borrower_partial_commit() {
    let stack = test_helpers::create_import_stack().unwrap();
    test_helpers::seed_member(&stack.db_path, "u1", "known@x.com").unwrap();

    let csv = "Loan Number,Borrower Email,Amount\n\
               L-001,known@x.com,5000\n\
               L-002,ghost@x.com,3000\n";
    let session = stack
        .api
        .create_session("admin", "loans.csv", ImportType::Loans, true, None, csv.as_bytes())
        .await
        .unwrap();
    stack
        .api
        .update_mapping(
            "admin",
            &session.id,
            mapping(&[
                ("Loan Number", "loanNumber"),
                ("Borrower Email", "borrowerEmail"),
                ("Amount", "amount"),
            ]),
            None,
        )
        .await
        .unwrap();

    let summary = stack.api.validate("admin", &session.id).await.unwrap();
    assert!(summary.is_valid, "格式层面应通过: {:?}", summary.findings);

    stack.api.start_import("admin", &session.id).await.unwrap();
    stack.runner.process_next().await.unwrap();

    let done = stack.api.get_session("admin", &session.id).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.success_rows, 1);
    assert_eq!(done.failed_rows, 1);

    // 成功行已提交，失败行记录在错误报告
    assert_eq!(test_helpers::count_rows(&stack.db_path, "loan"), 1);
    let report = done.error_report.unwrap();
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].row_number, 2);
    assert!(report.rows[0].message.contains("ghost@x.com"));
}

// ==========================================
// 测试用例 4: 状态机守卫
// ==========================================
#[tokio::test]
async fn test_state_machine_guards() {
    let stack = test_helpers::create_import_stack().unwrap();

    let csv = "Email\na@x.com\n";
    let session = stack
        .api
        .create_session("admin", "g.csv", ImportType::Users, true, None, csv.as_bytes())
        .await
        .unwrap();

    // 未校验不可启动
    assert!(stack.api.start_import("admin", &session.id).await.is_err());
    // 空映射被拒绝
    assert!(stack
        .api
        .update_mapping("admin", &session.id, Vec::new(), None)
        .await
        .is_err());

    // PENDING 可取消；取消后为终态
    let cancelled = stack.api.cancel("admin", &session.id).await.unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert!(stack.api.cancel("admin", &session.id).await.is_err());
    assert!(stack.api.preview("admin", &session.id).await.is_err());
}

// ==========================================
// 测试用例 5: 归属检查
// ==========================================
#[tokio::test]
async fn test_ownership_enforced() {
    let stack = test_helpers::create_import_stack().unwrap();

    let csv = "Email\na@x.com\n";
    let session = stack
        .api
        .create_session("alice", "o.csv", ImportType::Users, true, None, csv.as_bytes())
        .await
        .unwrap();

    // 他人访问被拒绝
    assert!(stack.api.get_session("bob", &session.id).await.is_err());
    assert!(stack.api.delete("bob", &session.id).await.is_err());

    // 列表只见本人会话
    let filter = microfin_import::repository::SessionFilter {
        page: 1,
        limit: 10,
        ..Default::default()
    };
    let page = stack.api.list_sessions("bob", &filter).await.unwrap();
    assert_eq!(page.total, 0);
}

// ==========================================
// 测试用例 6: 任务失败重试耗尽 → 会话 FAILED
// ==========================================
#[tokio::test]
async fn test_job_retry_exhaustion_marks_session_failed() {
    let stack = test_helpers::create_import_stack().unwrap();

    let csv = "Email,First Name,Last Name\na@x.com,A,One\n";
    let session = stack
        .api
        .create_session("admin", "f.csv", ImportType::Users, true, None, csv.as_bytes())
        .await
        .unwrap();
    stack
        .api
        .update_mapping(
            "admin",
            &session.id,
            mapping(&[
                ("Email", "email"),
                ("First Name", "firstName"),
                ("Last Name", "lastName"),
            ]),
            None,
        )
        .await
        .unwrap();
    stack.api.validate("admin", &session.id).await.unwrap();
    stack.api.start_import("admin", &session.id).await.unwrap();

    // 源文件丢失 → 每次执行都失败
    std::fs::remove_file(&session.file_path).unwrap();

    // 3 次尝试（退避间隔 10ms 起）
    for _ in 0..3 {
        stack.runner.process_next().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    let failed = stack.api.get_session("admin", &session.id).await.unwrap();
    assert_eq!(failed.status, SessionStatus::Failed);
    let report = failed.error_report.unwrap();
    assert!(report.fatal.is_some());
}

// ==========================================
// 测试用例 7: 删除会话清理落盘文件
// ==========================================
#[tokio::test]
async fn test_delete_removes_file_and_session() {
    let stack = test_helpers::create_import_stack().unwrap();

    let csv = "Email\na@x.com\n";
    let session = stack
        .api
        .create_session("admin", "d.csv", ImportType::Users, true, None, csv.as_bytes())
        .await
        .unwrap();
    assert!(std::path::Path::new(&session.file_path).exists());

    stack.api.delete("admin", &session.id).await.unwrap();
    assert!(!std::path::Path::new(&session.file_path).exists());
    assert!(stack.api.get_session("admin", &session.id).await.is_err());
}

// ==========================================
// 测试用例 8: Excel 扩展名拒绝之外的格式
// ==========================================
#[tokio::test]
async fn test_unsupported_extension_rejected_before_io() {
    let stack = test_helpers::create_import_stack().unwrap();

    let err = stack
        .api
        .create_session("admin", "data.pdf", ImportType::Users, true, None, b"%PDF-")
        .await;
    assert!(err.is_err());

    // 未落盘任何文件
    let repo_page = stack
        .api
        .list_sessions(
            "admin",
            &microfin_import::repository::SessionFilter {
                page: 1,
                limit: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(repo_page.total, 0);
}

// ==========================================
// 测试用例 9: 落库任务入队后映射与校验冻结
// ==========================================
#[tokio::test]
async fn test_mapping_frozen_while_apply_job_queued() {
    let stack = test_helpers::create_import_stack().unwrap();

    let csv = "Email,First Name,Last Name\na@x.com,A,One\n";
    let session = stack
        .api
        .create_session("admin", "m.csv", ImportType::Users, true, None, csv.as_bytes())
        .await
        .unwrap();
    let full_mapping = mapping(&[
        ("Email", "email"),
        ("First Name", "firstName"),
        ("Last Name", "lastName"),
    ]);
    stack
        .api
        .update_mapping("admin", &session.id, full_mapping.clone(), None)
        .await
        .unwrap();
    stack.api.validate("admin", &session.id).await.unwrap();
    stack.api.start_import("admin", &session.id).await.unwrap();

    // 任务在队列中尚未执行: 映射替换与重新校验都被拒绝
    let remap = stack
        .api
        .update_mapping(
            "admin",
            &session.id,
            mapping(&[("Email", "lastName")]),
            None,
        )
        .await;
    assert!(remap.is_err(), "入队后映射应被冻结");
    assert!(
        stack.api.validate("admin", &session.id).await.is_err(),
        "入队后不可重新校验"
    );

    // 映射未被改动，任务按原映射正常落库
    stack.runner.process_next().await.unwrap();
    let done = stack.api.get_session("admin", &session.id).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.column_mapping, full_mapping);
    assert_eq!(done.success_rows, 1);
    assert_eq!(test_helpers::count_rows(&stack.db_path, "member_user"), 1);
}
