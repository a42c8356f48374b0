use crate::domain::{DomainError, policy::DenialReason};
use crate::repository::RepositoryError;
use thiserror::Error;

/// 貸出サービスのエラー
///
/// `PersistenceFailure`以外はリポジトリに一切変更を加えずに返される。
/// `PersistenceFailure`の場合もメモリ上の変更は取り消し済み。
#[derive(Debug, Error)]
pub enum LendingError {
    /// 書籍・会員・取引が存在しない
    #[error("Not found: {0}")]
    NotFound(String),

    /// 貸出ポリシーにより拒否された
    #[error("Policy violation: {0}")]
    PolicyViolation(#[from] DenialReason),

    /// 取引の状態が操作を許さない（終了済み、未払い罰金なし、金額不一致など）
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 永続化に失敗した
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] RepositoryError),
}

impl From<DomainError> for LendingError {
    fn from(err: DomainError) -> Self {
        LendingError::InvalidState(err.to_string())
    }
}

/// 貸出サービスの Result型
pub type Result<T> = std::result::Result<T, LendingError>;
