use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{BookId, DomainError, EntityMeta, Searchable, Validatable};

/// 書籍の貸出可否ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    /// 貸出可能
    Available,
    /// 貸出中（未終了の貸出取引がちょうど1件ある）
    Borrowed,
    /// 取り置き中
    Reserved,
    /// 紛失
    Lost,
}

impl BookStatus {
    pub const ALL: [BookStatus; 4] = [
        BookStatus::Available,
        BookStatus::Borrowed,
        BookStatus::Reserved,
        BookStatus::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "AVAILABLE",
            BookStatus::Borrowed => "BORROWED",
            BookStatus::Reserved => "RESERVED",
            BookStatus::Lost => "LOST",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid book status: {}", s))
    }
}

/// 書籍の分類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookCategory {
    Fiction,
    NonFiction,
    Science,
    History,
    Biography,
    Technology,
    Education,
    Children,
    #[default]
    Other,
}

impl BookCategory {
    pub const ALL: [BookCategory; 9] = [
        BookCategory::Fiction,
        BookCategory::NonFiction,
        BookCategory::Science,
        BookCategory::History,
        BookCategory::Biography,
        BookCategory::Technology,
        BookCategory::Education,
        BookCategory::Children,
        BookCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookCategory::Fiction => "FICTION",
            BookCategory::NonFiction => "NON_FICTION",
            BookCategory::Science => "SCIENCE",
            BookCategory::History => "HISTORY",
            BookCategory::Biography => "BIOGRAPHY",
            BookCategory::Technology => "TECHNOLOGY",
            BookCategory::Education => "EDUCATION",
            BookCategory::Children => "CHILDREN",
            BookCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for BookCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 書籍登録時の入力
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    #[serde(default)]
    pub category: BookCategory,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub description: String,
}

/// 書籍エンティティ
///
/// フィールドは非公開。変更は名前付きメソッド経由のみで、
/// 変更のたびに再検証し`updated_at`を更新する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    id: BookId,
    title: String,
    author: String,
    isbn: String,
    category: BookCategory,
    publisher: String,
    publication_year: Option<i32>,
    description: String,
    status: BookStatus,
    #[serde(flatten)]
    meta: EntityMeta,
}

impl Book {
    /// 新しい書籍を作成する（ステータスはAVAILABLE）
    pub fn new(input: NewBook, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let book = Self {
            id: BookId::new(),
            title: input.title.trim().to_string(),
            author: input.author.trim().to_string(),
            isbn: input.isbn.trim().to_string(),
            category: input.category,
            publisher: input.publisher.trim().to_string(),
            publication_year: input.publication_year,
            description: input.description.trim().to_string(),
            status: BookStatus::Available,
            meta: EntityMeta::new(now),
        };
        book.validate()?;
        Ok(book)
    }

    pub fn id(&self) -> BookId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn category(&self) -> BookCategory {
        self.category
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn publication_year(&self) -> Option<i32> {
        self.publication_year
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> BookStatus {
        self.status
    }

    pub fn is_available(&self) -> bool {
        self.status == BookStatus::Available
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.meta.updated_at
    }

    pub fn set_title(&mut self, title: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.update(now, |book| book.title = title.trim().to_string())
    }

    pub fn set_author(&mut self, author: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.update(now, |book| book.author = author.trim().to_string())
    }

    /// ISBNを変更する（書式とコレクション内の一意性は呼び出し側で確認済みであること）
    pub fn set_isbn(&mut self, isbn: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.update(now, |book| book.isbn = isbn.trim().to_string())
    }

    pub fn set_category(
        &mut self,
        category: BookCategory,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.update(now, |book| book.category = category)
    }

    pub fn set_publisher(&mut self, publisher: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.update(now, |book| book.publisher = publisher.trim().to_string())
    }

    pub fn set_publication_year(
        &mut self,
        year: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.update(now, |book| book.publication_year = year)
    }

    pub fn set_description(
        &mut self,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.update(now, |book| book.description = description.trim().to_string())
    }

    /// 管理操作によるステータス変更（取り置き・紛失・復帰）
    ///
    /// BORROWEDへの遷移とBORROWEDからの遷移は貸出・返却処理だけが行う。
    pub fn set_status(&mut self, status: BookStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if status == BookStatus::Borrowed || self.status == BookStatus::Borrowed {
            return Err(DomainError::InvalidBookStatusChange {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.meta.touch(now);
        Ok(())
    }

    /// 貸出処理：AVAILABLE → BORROWED
    pub(crate) fn mark_borrowed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != BookStatus::Available {
            return Err(DomainError::InvalidBookStatusChange {
                from: self.status,
                to: BookStatus::Borrowed,
            });
        }
        self.status = BookStatus::Borrowed;
        self.meta.touch(now);
        Ok(())
    }

    /// 返却・取消処理：BORROWED → AVAILABLE
    pub(crate) fn mark_returned(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != BookStatus::Borrowed {
            return Err(DomainError::InvalidBookStatusChange {
                from: self.status,
                to: BookStatus::Available,
            });
        }
        self.status = BookStatus::Available;
        self.meta.touch(now);
        Ok(())
    }

    /// 変更を試し、検証に通った場合だけ反映する
    fn update(
        &mut self,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut Book),
    ) -> Result<(), DomainError> {
        let mut candidate = self.clone();
        change(&mut candidate);
        candidate.meta.touch(now);
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

impl Searchable for Book {
    fn search_fields(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.author.clone(),
            self.isbn.clone(),
            self.publisher.clone(),
            self.description.clone(),
            self.category.as_str().to_string(),
        ]
    }
}

impl Validatable for Book {
    fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.title.is_empty() {
            errors.push("Title is required".to_string());
        }
        if self.author.is_empty() {
            errors.push("Author is required".to_string());
        }
        if self.isbn.is_empty() {
            errors.push("ISBN is required".to_string());
        }
        if let Some(year) = self.publication_year {
            let latest = self.meta.updated_at.year();
            if year < 0 || year > latest {
                errors.push(format!("Publication year must be between 0 and {}", latest));
            }
        }

        errors
    }
}
