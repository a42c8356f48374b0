use crate::domain::DomainError;
use crate::repository::RepositoryError;
use thiserror::Error;

/// 蔵書・会員管理のエラー
#[derive(Debug, Error)]
pub enum CatalogError {
    /// 書籍・会員が存在しない
    #[error("Not found: {0}")]
    NotFound(String),

    /// 入力値の検証エラー
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// 同じISBNの書籍がすでに登録されている
    #[error("Book with ISBN {0} already exists")]
    DuplicateIsbn(String),

    /// 取引から参照されているため削除できない
    #[error("In use: {0}")]
    InUse(String),

    /// 現在の状態では行えない操作
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 永続化に失敗した
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] RepositoryError),
}

impl From<DomainError> for CatalogError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => CatalogError::Validation(errors),
            other => CatalogError::InvalidState(other.to_string()),
        }
    }
}

/// 蔵書・会員管理の Result型
pub type Result<T> = std::result::Result<T, CatalogError>;
