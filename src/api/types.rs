use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Book, BookCategory, BookStatus, ContactInfo, Member, MemberStatus, MembershipTier,
    Transaction, TransactionState, TransactionType,
};

// ============================================================================
// Requests
// ============================================================================

/// 貸出リクエスト（POST /loans）
#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    pub book_id: Uuid,
    pub member_id: Uuid,
}

/// 罰金支払いリクエスト（POST /loans/:id/pay-fine）
#[derive(Debug, Deserialize)]
pub struct PayFineRequest {
    pub amount: u64,
}

/// 書籍ステータス変更リクエスト（POST /books/:id/status）
#[derive(Debug, Deserialize)]
pub struct SetBookStatusRequest {
    pub status: BookStatus,
}

/// 会員資格延長リクエスト（POST /members/:id/renew）
#[derive(Debug, Deserialize)]
pub struct RenewMembershipRequest {
    #[serde(default = "default_renewal_years")]
    pub years: u32,
}

fn default_renewal_years() -> u32 {
    1
}

// ============================================================================
// Responses
// ============================================================================

/// 書籍レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: BookCategory,
    pub publisher: String,
    pub publication_year: Option<i32>,
    pub description: String,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id().value(),
            title: book.title().to_string(),
            author: book.author().to_string(),
            isbn: book.isbn().to_string(),
            category: book.category(),
            publisher: book.publisher().to_string(),
            publication_year: book.publication_year(),
            description: book.description().to_string(),
            status: book.status(),
            created_at: book.created_at(),
            updated_at: book.updated_at(),
        }
    }
}

/// 会員レスポンス（未終了の貸出数を含む）
#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub id: Uuid,
    pub name: String,
    pub contact: ContactInfo,
    pub tier: MembershipTier,
    pub status: MemberStatus,
    pub expiration_date: NaiveDate,
    pub open_loans: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            id: member.id().value(),
            name: member.name().to_string(),
            contact: member.contact().clone(),
            tier: member.tier(),
            status: member.status(),
            expiration_date: member.expiration_date(),
            open_loans: member.open_loans(),
            created_at: member.created_at(),
            updated_at: member.updated_at(),
        }
    }
}

/// 取引レスポンス
///
/// `state`は応答時点の実効状態（期限を過ぎたPENDINGはOVERDUE）。
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub state: TransactionState,
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub renewal_count: u8,
    pub fine_amount: u64,
    pub processed_by: Uuid,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionResponse {
    pub fn new(transaction: &Transaction, now: DateTime<Utc>) -> Self {
        Self {
            id: transaction.id().value(),
            book_id: transaction.book_id().value(),
            member_id: transaction.member_id().value(),
            transaction_type: transaction.transaction_type(),
            state: transaction.effective_state(now),
            issued_at: transaction.issued_at(),
            due_date: transaction.due_date(),
            completed_at: transaction.completed_at(),
            renewal_count: transaction.renewal_count().value(),
            fine_amount: transaction.fine_amount(),
            processed_by: transaction.processed_by().value(),
            parent_id: transaction.parent_id().map(|id| id.value()),
            created_at: transaction.created_at(),
            updated_at: transaction.updated_at(),
        }
    }
}

/// 会員資格の一括失効結果（POST /members/expire-lapsed）
#[derive(Debug, Serialize, Deserialize)]
pub struct ExpiredMembersResponse {
    pub expired: Vec<Uuid>,
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
