use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DomainError;

/// 全エンティティ共通の監査情報
///
/// 継承ではなく各エンティティに埋め込んで使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityMeta {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    /// 更新日時を進める（時刻が巻き戻ることはない）
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// 検索可能なエンティティ
pub trait Searchable {
    /// 検索対象フィールドのいずれかに`query`が含まれるか（大文字小文字を区別しない）
    fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
    }

    fn search_fields(&self) -> Vec<String>;
}

/// 自己検証可能なエンティティ
pub trait Validatable {
    fn validation_errors(&self) -> Vec<String>;

    fn validate(&self) -> Result<(), DomainError> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(errors))
        }
    }
}
