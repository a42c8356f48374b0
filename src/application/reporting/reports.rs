//! 読み取り専用の集計
//!
//! すべて呼び出し時点の状態からロック内で計算する。キャッシュは持たない。
//! 延滞料はここでは確定せず、その時点の見込み額を返す。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::application::ServiceDependencies;
use crate::application::lending::{LendingError, Result};
use crate::domain::{
    BookCategory, BookId, BookStatus, MemberId, MemberStatus, TransactionId, TransactionType,
    policy,
};
use crate::repository;

/// 延滞一覧の1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueEntry {
    pub transaction_id: TransactionId,
    pub book_id: BookId,
    pub book_title: String,
    pub member_id: MemberId,
    pub member_name: String,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i64,
    /// `now`時点で返却した場合の延滞料（未確定）
    pub accrued_fine: u64,
}

/// 会員ごとの利用状況
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberActivity {
    pub member_id: MemberId,
    pub member_name: String,
    pub borrow_count: usize,
    pub return_count: usize,
    pub renewal_count: usize,
    pub open_loans: usize,
    pub overdue_loans: usize,
    /// 返却時に確定し、まだ支払われていない罰金の合計
    pub outstanding_fines: u64,
    /// 支払済みの罰金の合計
    pub fines_paid: u64,
    pub payment_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookStatusCounts {
    pub available: usize,
    pub borrowed: usize,
    pub reserved: usize,
    pub lost: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemberStatusCounts {
    pub active: usize,
    pub expired: usize,
    pub suspended: usize,
}

/// 蔵書・会員・取引の統計
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryStats {
    pub total_books: usize,
    pub books_by_status: BookStatusCounts,
    pub books_by_category: BTreeMap<String, usize>,
    pub overdue_loans: usize,
    pub total_members: usize,
    pub members_by_status: MemberStatusCounts,
    pub outstanding_fines: u64,
    pub total_transactions: usize,
    /// `now`と同じ日（UTC）に作成された取引の数
    pub transactions_today: usize,
}

/// 延滞中の貸出一覧（延滞日数の多い順）
pub fn overdue_report(deps: &ServiceDependencies, now: DateTime<Utc>) -> Vec<OverdueEntry> {
    let repo = repository::lock(&deps.repository);

    let mut entries: Vec<OverdueEntry> = repo
        .transactions()
        .filter(|t| t.is_overdue(now))
        .map(|t| OverdueEntry {
            transaction_id: t.id(),
            book_id: t.book_id(),
            book_title: repo
                .book(t.book_id())
                .map(|b| b.title().to_string())
                .unwrap_or_default(),
            member_id: t.member_id(),
            member_name: repo
                .member(t.member_id())
                .map(|m| m.name().to_string())
                .unwrap_or_default(),
            due_date: t.due_date(),
            days_overdue: policy::days_overdue(t, now),
            accrued_fine: policy::compute_fine(&deps.policy, t, now),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then(a.transaction_id.cmp(&b.transaction_id))
    });
    entries
}

/// 会員の利用状況を集計する
pub fn member_activity(
    deps: &ServiceDependencies,
    member_id: MemberId,
    now: DateTime<Utc>,
) -> Result<MemberActivity> {
    let repo = repository::lock(&deps.repository);
    let member = repo
        .member(member_id)
        .ok_or_else(|| LendingError::NotFound(format!("member {member_id}")))?;

    let mut activity = MemberActivity {
        member_id,
        member_name: member.name().to_string(),
        borrow_count: 0,
        return_count: 0,
        renewal_count: 0,
        open_loans: 0,
        overdue_loans: 0,
        outstanding_fines: 0,
        fines_paid: 0,
        payment_count: 0,
    };

    for t in repo.transactions_for_member(member_id) {
        match t.transaction_type() {
            TransactionType::Borrow => {
                activity.borrow_count += 1;
                activity.outstanding_fines =
                    activity.outstanding_fines.saturating_add(t.fine_amount());
                if t.is_open() {
                    activity.open_loans += 1;
                }
                if t.is_overdue(now) {
                    activity.overdue_loans += 1;
                }
            }
            TransactionType::Return => activity.return_count += 1,
            TransactionType::Renew => activity.renewal_count += 1,
            TransactionType::FinePayment => {
                activity.payment_count += 1;
                activity.fines_paid = activity.fines_paid.saturating_add(t.fine_amount());
            }
        }
    }

    Ok(activity)
}

/// 全体の統計
pub fn inventory_stats(deps: &ServiceDependencies, now: DateTime<Utc>) -> InventoryStats {
    let repo = repository::lock(&deps.repository);

    let mut books_by_status = BookStatusCounts::default();
    let mut books_by_category: BTreeMap<String, usize> = BookCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), 0))
        .collect();
    for book in repo.books() {
        match book.status() {
            BookStatus::Available => books_by_status.available += 1,
            BookStatus::Borrowed => books_by_status.borrowed += 1,
            BookStatus::Reserved => books_by_status.reserved += 1,
            BookStatus::Lost => books_by_status.lost += 1,
        }
        *books_by_category
            .entry(book.category().as_str().to_string())
            .or_default() += 1;
    }

    let mut members_by_status = MemberStatusCounts::default();
    for member in repo.members() {
        match member.status() {
            MemberStatus::Active => members_by_status.active += 1,
            MemberStatus::Expired => members_by_status.expired += 1,
            MemberStatus::Suspended => members_by_status.suspended += 1,
        }
    }

    let today = now.date_naive();
    let mut overdue_loans = 0;
    let mut outstanding_fines = 0u64;
    let mut transactions_today = 0;
    for t in repo.transactions() {
        if t.is_overdue(now) {
            overdue_loans += 1;
        }
        if t.is_borrow() {
            outstanding_fines = outstanding_fines.saturating_add(t.fine_amount());
        }
        if t.created_at().date_naive() == today {
            transactions_today += 1;
        }
    }

    InventoryStats {
        total_books: repo.books().count(),
        books_by_status,
        books_by_category,
        overdue_loans,
        total_members: repo.members().count(),
        members_by_status,
        outstanding_fines,
        total_transactions: repo.transactions().count(),
        transactions_today,
    }
}
