use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{
    BookId, DomainError, EntityMeta, MemberId, RenewalCount, Searchable, StaffId, TransactionId,
    Validatable,
};

/// 取引の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Borrow,
    Return,
    Renew,
    FinePayment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Borrow => "BORROW",
            TransactionType::Return => "RETURN",
            TransactionType::Renew => "RENEW",
            TransactionType::FinePayment => "FINE_PAYMENT",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 取引の状態
///
/// OVERDUEは原則として保存しない派生状態（`effective_state`で判定）。
/// 値としては読み込み互換のために受け付ける。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Pending,
    Completed,
    Overdue,
    Cancelled,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "PENDING",
            TransactionState::Completed => "COMPLETED",
            TransactionState::Overdue => "OVERDUE",
            TransactionState::Cancelled => "CANCELLED",
        }
    }

    /// COMPLETED / CANCELLEDは終端状態
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Completed | TransactionState::Cancelled
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 取引エンティティ
///
/// 貸出（BORROW）レコードは貸出で作られ、返却・延長・罰金精算で同じレコードが更新される。
/// 各操作は監査用に`parent_id`で貸出を指す後続レコード（RETURN / RENEW / FINE_PAYMENT）を残す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    book_id: BookId,
    member_id: MemberId,
    #[serde(rename = "type")]
    transaction_type: TransactionType,
    state: TransactionState,
    issued_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    renewal_count: RenewalCount,
    fine_amount: u64,
    processed_by: StaffId,
    parent_id: Option<TransactionId>,
    #[serde(flatten)]
    meta: EntityMeta,
}

impl Transaction {
    /// 貸出レコードを作成する（状態はPENDING）
    pub fn open_borrow(
        book_id: BookId,
        member_id: MemberId,
        issued_at: DateTime<Utc>,
        due_date: DateTime<Utc>,
        processed_by: StaffId,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            book_id,
            member_id,
            transaction_type: TransactionType::Borrow,
            state: TransactionState::Pending,
            issued_at,
            due_date,
            completed_at: None,
            renewal_count: RenewalCount::new(),
            fine_amount: 0,
            processed_by,
            parent_id: None,
            meta: EntityMeta::new(issued_at),
        }
    }

    /// 貸出に紐づく監査用の後続レコードを作成する（作成時点で完了済み）
    ///
    /// `amount`はRETURNでは確定した罰金額、FINE_PAYMENTでは支払額。
    pub fn follow_up(
        parent: &Transaction,
        transaction_type: TransactionType,
        at: DateTime<Utc>,
        amount: u64,
        processed_by: StaffId,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            book_id: parent.book_id,
            member_id: parent.member_id,
            transaction_type,
            state: TransactionState::Completed,
            issued_at: at,
            due_date: parent.due_date,
            completed_at: Some(at),
            renewal_count: parent.renewal_count,
            fine_amount: amount,
            processed_by,
            parent_id: Some(parent.id),
            meta: EntityMeta::new(at),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    /// 保存されている状態
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn renewal_count(&self) -> RenewalCount {
        self.renewal_count
    }

    /// 確定済みで未払いの罰金（後続レコードでは記録された金額）
    pub fn fine_amount(&self) -> u64 {
        self.fine_amount
    }

    pub fn processed_by(&self) -> StaffId {
        self.processed_by
    }

    pub fn parent_id(&self) -> Option<TransactionId> {
        self.parent_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.meta.updated_at
    }

    pub fn is_borrow(&self) -> bool {
        self.transaction_type == TransactionType::Borrow
    }

    /// 未終了の貸出か
    pub fn is_open(&self) -> bool {
        self.is_borrow() && !self.state.is_terminal()
    }

    /// 現在時刻から見た状態（PENDINGで返却期限を過ぎていればOVERDUE）
    pub fn effective_state(&self, now: DateTime<Utc>) -> TransactionState {
        match self.state {
            TransactionState::Pending if self.is_borrow() && now > self.due_date => {
                TransactionState::Overdue
            }
            state => state,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now > self.due_date
    }

    /// 返却：罰金を確定してCOMPLETEDにする
    pub(crate) fn complete(&mut self, fine: u64, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.state = TransactionState::Completed;
        self.completed_at = Some(now);
        self.fine_amount = fine;
        self.meta.touch(now);
        Ok(())
    }

    /// 延長：返却期限を更新し、延長回数を1増やす。OVERDUEだった場合はPENDINGに戻る。
    pub(crate) fn renew(
        &mut self,
        new_due_date: DateTime<Utc>,
        cap: u8,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.renewal_count = self.renewal_count.increment(cap)?;
        self.due_date = new_due_date;
        self.state = TransactionState::Pending;
        self.meta.touch(now);
        Ok(())
    }

    /// 管理操作による取消
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.state = TransactionState::Cancelled;
        self.completed_at = Some(now);
        self.meta.touch(now);
        Ok(())
    }

    /// 罰金の精算。終端状態の貸出に許される唯一の変更。
    ///
    /// 精算した金額を返す。
    pub(crate) fn settle_fine(&mut self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        if !self.is_borrow() {
            return Err(DomainError::NotABorrow);
        }
        if self.fine_amount == 0 {
            return Err(DomainError::NoOutstandingFine);
        }
        let paid = self.fine_amount;
        self.fine_amount = 0;
        self.meta.touch(now);
        Ok(paid)
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.is_borrow() {
            return Err(DomainError::NotABorrow);
        }
        if self.state.is_terminal() {
            return Err(DomainError::TerminalTransaction(self.state));
        }
        Ok(())
    }
}

impl Searchable for Transaction {
    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.book_id.to_string(),
            self.member_id.to_string(),
            self.transaction_type.as_str().to_string(),
            self.state.as_str().to_string(),
            self.processed_by.to_string(),
        ]
    }
}

impl Validatable for Transaction {
    fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.is_borrow() {
            if self.due_date < self.issued_at {
                errors.push("Due date cannot be before issue date".to_string());
            }
            if self.parent_id.is_some() {
                errors.push("Borrow transactions have no parent".to_string());
            }
        } else if self.parent_id.is_none() {
            errors.push(format!(
                "{} transactions must reference their borrow transaction",
                self.transaction_type
            ));
        }

        if self.state.is_terminal() != self.completed_at.is_some() {
            errors.push("Completion date must be set exactly when the transaction is closed".to_string());
        }

        errors
    }
}
