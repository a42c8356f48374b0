use thiserror::Error;

/// リポジトリ層のエラー
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// スナップショットストアの読み書きに失敗した
    #[error("Snapshot store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// 対応していないスナップショット形式
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// 読み込んだスナップショットの内容が矛盾している
    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// リポジトリ層の Result型
pub type Result<T> = std::result::Result<T, RepositoryError>;
