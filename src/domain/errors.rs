use thiserror::Error;

use super::{BookStatus, RenewalError, TransactionState};

/// ドメイン層のエラー
///
/// エンティティの変更メソッドが不変条件を守れない場合に返す。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// フィールド検証エラー
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// 許可されていない書籍ステータス遷移
    #[error("book status cannot change from {from} to {to}")]
    InvalidBookStatusChange { from: BookStatus, to: BookStatus },

    /// 終端状態（COMPLETED / CANCELLED）の取引は変更できない
    #[error("transaction is already {0}")]
    TerminalTransaction(TransactionState),

    /// 貸出以外の取引に貸出専用の操作をした
    #[error("operation applies to borrow transactions only")]
    NotABorrow,

    /// 延長回数の上限
    #[error("renewal limit of {cap} reached")]
    RenewalLimitExceeded { cap: u8 },

    /// 未払いの罰金がない
    #[error("transaction has no outstanding fine")]
    NoOutstandingFine,

    /// 会員資格の再開ができない
    #[error("membership cannot be reactivated")]
    NotReactivatable,
}

impl From<RenewalError> for DomainError {
    fn from(err: RenewalError) -> Self {
        match err {
            RenewalError::LimitExceeded { cap } => DomainError::RenewalLimitExceeded { cap },
        }
    }
}
