// ==========================================
// 小额信贷平台 - 落库策略实现
// ==========================================

pub mod contributions;
pub mod loans;
pub mod stubs;
pub mod users;

pub use contributions::ContributionImporter;
pub use loans::LoanImporter;
pub use stubs::{GuaranteeImporter, PaymentImporter};
pub use users::UserImporter;
