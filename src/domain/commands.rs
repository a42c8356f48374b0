use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookId, MemberId, StaffId, TransactionId};

/// コマンド：書籍を貸し出す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowBook {
    pub book_id: BookId,
    pub member_id: MemberId,
    pub borrowed_at: DateTime<Utc>,
    pub staff_id: StaffId,
}

/// コマンド：書籍を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnBook {
    pub transaction_id: TransactionId,
    pub returned_at: DateTime<Utc>,
    pub staff_id: StaffId,
}

/// コマンド：貸出を延長する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewLoan {
    pub transaction_id: TransactionId,
    pub renewed_at: DateTime<Utc>,
    pub staff_id: StaffId,
}

/// コマンド：延滞料を支払う（全額のみ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayFine {
    pub transaction_id: TransactionId,
    pub amount: u64,
    pub paid_at: DateTime<Utc>,
    pub staff_id: StaffId,
}

/// コマンド：貸出を取り消す（管理操作）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelLoan {
    pub transaction_id: TransactionId,
    pub cancelled_at: DateTime<Utc>,
    pub staff_id: StaffId,
}
