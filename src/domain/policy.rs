//! 貸出ポリシー（純粋関数）
//!
//! すべての関数は副作用を持たず、リポジトリにも触れない。
//! 判定は常に`Decision`を返し、パニックしない。

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Book, BookStatus, Member, MemberStatus, MembershipTier, Transaction, TransactionState,
};

/// 貸出期間の既定値（日数）
pub const DEFAULT_LOAN_PERIOD_DAYS: i64 = 14;

/// 1日あたりの延滞料の既定値（通貨の最小単位）
pub const DEFAULT_DAILY_FINE_RATE: u64 = 20_000;

/// 延長回数上限の既定値
pub const DEFAULT_RENEWAL_CAP: u8 = 2;

/// 貸出期間として受け付ける最大日数
pub const MAX_LOAN_PERIOD_DAYS: i64 = 3650;

/// 会員区分ごとの上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub borrow_limit: u32,
    pub renewal_cap: u8,
}

/// 貸出ポリシーの設定値
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPolicy {
    pub standard: TierPolicy,
    pub premium: TierPolicy,
    pub student: TierPolicy,
    pub loan_period_days: i64,
    pub daily_fine_rate: u64,
    /// 1件あたりの罰金の上限（Noneなら上限なし）
    pub max_fine: Option<u64>,
    /// 未払い罰金のある会員の新規貸出を拒否するか
    pub block_borrow_on_unpaid_fine: bool,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            standard: TierPolicy {
                borrow_limit: 3,
                renewal_cap: DEFAULT_RENEWAL_CAP,
            },
            premium: TierPolicy {
                borrow_limit: 10,
                renewal_cap: DEFAULT_RENEWAL_CAP,
            },
            student: TierPolicy {
                borrow_limit: 5,
                renewal_cap: DEFAULT_RENEWAL_CAP,
            },
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            daily_fine_rate: DEFAULT_DAILY_FINE_RATE,
            max_fine: None,
            block_borrow_on_unpaid_fine: true,
        }
    }
}

impl LendingPolicy {
    pub fn tier(&self, tier: MembershipTier) -> TierPolicy {
        match tier {
            MembershipTier::Standard => self.standard,
            MembershipTier::Premium => self.premium,
            MembershipTier::Student => self.student,
        }
    }

    /// 貸出期間（`Duration`で表せない日数ならNone）
    pub fn loan_period(&self) -> Option<Duration> {
        Duration::try_days(self.loan_period_days)
    }
}

/// 拒否理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenialReason {
    #[error("book is not available (status: {status})")]
    BookUnavailable { status: BookStatus },

    #[error("member is not active (status: {status})")]
    MemberNotActive { status: MemberStatus },

    #[error("membership expired on {expired_on}")]
    MembershipExpired { expired_on: NaiveDate },

    #[error("borrow limit reached ({limit} books for {tier} members)")]
    BorrowLimitReached { tier: MembershipTier, limit: u32 },

    #[error("member has unpaid fines ({amount})")]
    UnpaidFines { amount: u64 },

    #[error("only borrow transactions can be renewed")]
    NotABorrow,

    #[error("transaction cannot be renewed in state {state}")]
    NotRenewable { state: TransactionState },

    #[error("renewal limit reached ({cap} renewals for {tier} members)")]
    RenewalCapReached { tier: MembershipTier, cap: u8 },

    #[error("transaction has an outstanding fine ({amount})")]
    OutstandingFine { amount: u64 },
}

/// ポリシー判定の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn into_result(self) -> Result<(), DenialReason> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(reason),
        }
    }
}

/// 貸出可否の判定
///
/// `member_loans`は会員の貸出レコード（終了済みを含んでよい）。
/// 未終了の件数と未払い罰金の合計はここから求める。
///
/// 拒否条件（判定順）：
/// - 書籍がAVAILABLEでない
/// - 会員がACTIVEでない
/// - 会員資格の有効期限切れ
/// - 未終了の貸出数が区分の上限以上
/// - 未払い罰金がある（`block_borrow_on_unpaid_fine`が有効な場合）
pub fn can_borrow(
    policy: &LendingPolicy,
    member: &Member,
    book: &Book,
    member_loans: &[&Transaction],
    now: DateTime<Utc>,
) -> Decision {
    if book.status() != BookStatus::Available {
        return Decision::Denied(DenialReason::BookUnavailable {
            status: book.status(),
        });
    }

    if member.status() != MemberStatus::Active {
        return Decision::Denied(DenialReason::MemberNotActive {
            status: member.status(),
        });
    }

    if !member.is_membership_valid(now) {
        return Decision::Denied(DenialReason::MembershipExpired {
            expired_on: member.expiration_date(),
        });
    }

    let loans = member_loans
        .iter()
        .filter(|loan| loan.member_id() == member.id() && loan.is_borrow());

    let open_count = loans.clone().filter(|loan| loan.is_open()).count();
    let limit = policy.tier(member.tier()).borrow_limit;
    if open_count >= limit as usize {
        return Decision::Denied(DenialReason::BorrowLimitReached {
            tier: member.tier(),
            limit,
        });
    }

    if policy.block_borrow_on_unpaid_fine {
        let unpaid = loans.fold(0u64, |sum, loan| sum.saturating_add(loan.fine_amount()));
        if unpaid > 0 {
            return Decision::Denied(DenialReason::UnpaidFines { amount: unpaid });
        }
    }

    Decision::Allowed
}

/// 延長可否の判定
///
/// 拒否条件：貸出でない、状態がPENDING / OVERDUE以外、延長回数が上限、罰金がある。
/// 罰金は記録済みの額と`now`時点で発生している延滞料の大きい方。
/// 延長で返却期限が先に進むと発生済みの延滞料が消えるため、延滞料の付いた貸出は延長できない。
pub fn can_renew(
    policy: &LendingPolicy,
    transaction: &Transaction,
    member: &Member,
    now: DateTime<Utc>,
) -> Decision {
    if !transaction.is_borrow() {
        return Decision::Denied(DenialReason::NotABorrow);
    }

    let state = transaction.state();
    if !matches!(state, TransactionState::Pending | TransactionState::Overdue) {
        return Decision::Denied(DenialReason::NotRenewable { state });
    }

    let cap = policy.tier(member.tier()).renewal_cap;
    if !transaction.renewal_count().can_renew(cap) {
        return Decision::Denied(DenialReason::RenewalCapReached {
            tier: member.tier(),
            cap,
        });
    }

    let outstanding = transaction
        .fine_amount()
        .max(compute_fine(policy, transaction, now));
    if outstanding > 0 {
        return Decision::Denied(DenialReason::OutstandingFine {
            amount: outstanding,
        });
    }

    Decision::Allowed
}

/// 延滞料の計算
///
/// `as_of`が返却期限以前なら0。それ以降は（期限超過の日数（端数切り捨て）× 日額）。
/// 同じ入力に対して常に同じ値を返し、`as_of`に対して単調非減少。
pub fn compute_fine(policy: &LendingPolicy, transaction: &Transaction, as_of: DateTime<Utc>) -> u64 {
    let due_date = transaction.due_date();
    if as_of <= due_date {
        return 0;
    }

    let days_late = (as_of - due_date).num_days().max(0) as u64;
    let fine = days_late.saturating_mul(policy.daily_fine_rate);

    match policy.max_fine {
        Some(cap) => fine.min(cap),
        None => fine,
    }
}

/// 返却期限：起点 + 貸出期間
///
/// 表現できる範囲を超える場合は`DateTime::<Utc>::MAX_UTC`に丸める。
pub fn next_due_date(policy: &LendingPolicy, issued_at: DateTime<Utc>) -> DateTime<Utc> {
    policy
        .loan_period()
        .and_then(|period| issued_at.checked_add_signed(period))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// 延滞日数（延滞していなければ0）
pub fn days_overdue(transaction: &Transaction, now: DateTime<Utc>) -> i64 {
    if !transaction.is_overdue(now) {
        return 0;
    }
    (now - transaction.due_date()).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BookCategory, BookId, ContactInfo, NewBook, NewMember, StaffId};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn book() -> Book {
        Book::new(
            NewBook {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                isbn: "9780441172719".to_string(),
                category: BookCategory::Fiction,
                ..Default::default()
            },
            now(),
        )
        .unwrap()
    }

    fn member(tier: MembershipTier) -> Member {
        Member::new(
            NewMember {
                name: "Paul Atreides".to_string(),
                contact: ContactInfo::new("paul@arrakis.example", ""),
                tier,
                expiration_date: None,
            },
            now(),
        )
        .unwrap()
    }

    fn loan_for(member: &Member, issued_at: DateTime<Utc>) -> Transaction {
        let policy = LendingPolicy::default();
        Transaction::open_borrow(
            BookId::new(),
            member.id(),
            issued_at,
            next_due_date(&policy, issued_at),
            StaffId::system(),
        )
    }

    #[test]
    fn test_can_borrow_allows_active_member_with_available_book() {
        let policy = LendingPolicy::default();
        let decision = can_borrow(&policy, &member(MembershipTier::Standard), &book(), &[], now());
        assert_eq!(decision, Decision::Allowed);
    }

    #[test]
    fn test_can_borrow_denies_unavailable_book() {
        let policy = LendingPolicy::default();
        let mut book = book();
        book.mark_borrowed(now()).unwrap();

        let decision = can_borrow(&policy, &member(MembershipTier::Standard), &book, &[], now());
        assert_eq!(
            decision,
            Decision::Denied(DenialReason::BookUnavailable {
                status: BookStatus::Borrowed
            })
        );
    }

    #[test]
    fn test_can_borrow_denies_suspended_member() {
        let policy = LendingPolicy::default();
        let mut member = member(MembershipTier::Premium);
        member.suspend(now());

        let decision = can_borrow(&policy, &member, &book(), &[], now());
        assert_eq!(
            decision,
            Decision::Denied(DenialReason::MemberNotActive {
                status: MemberStatus::Suspended
            })
        );
    }

    #[test]
    fn test_can_borrow_denies_expired_membership() {
        let policy = LendingPolicy::default();
        let member = member(MembershipTier::Standard);
        let later = now() + Duration::days(400);

        let decision = can_borrow(&policy, &member, &book(), &[], later);
        assert!(matches!(
            decision,
            Decision::Denied(DenialReason::MembershipExpired { .. })
        ));
    }

    #[test]
    fn test_can_borrow_enforces_tier_limits() {
        let policy = LendingPolicy::default();

        for (tier, limit) in [
            (MembershipTier::Standard, 3),
            (MembershipTier::Premium, 10),
            (MembershipTier::Student, 5),
        ] {
            let member = member(tier);
            let loans: Vec<Transaction> = (0..limit).map(|_| loan_for(&member, now())).collect();
            let refs: Vec<&Transaction> = loans.iter().collect();

            let under = can_borrow(&policy, &member, &book(), &refs[..limit - 1], now());
            assert!(under.is_allowed(), "{tier} should allow below limit");

            let at = can_borrow(&policy, &member, &book(), &refs, now());
            assert_eq!(
                at,
                Decision::Denied(DenialReason::BorrowLimitReached {
                    tier,
                    limit: limit as u32
                })
            );
        }
    }

    #[test]
    fn test_can_borrow_ignores_closed_loans() {
        let policy = LendingPolicy::default();
        let member = member(MembershipTier::Standard);
        let mut loans: Vec<Transaction> = (0..3).map(|_| loan_for(&member, now())).collect();
        loans[0].complete(0, now()).unwrap();
        let refs: Vec<&Transaction> = loans.iter().collect();

        assert!(can_borrow(&policy, &member, &book(), &refs, now()).is_allowed());
    }

    #[test]
    fn test_unpaid_fine_flag() {
        let member = member(MembershipTier::Standard);
        let mut returned = loan_for(&member, now());
        returned.complete(20_000, now() + Duration::days(15)).unwrap();
        let refs = vec![&returned];

        let blocking = LendingPolicy::default();
        assert_eq!(
            can_borrow(&blocking, &member, &book(), &refs, now()),
            Decision::Denied(DenialReason::UnpaidFines { amount: 20_000 })
        );

        let lenient = LendingPolicy {
            block_borrow_on_unpaid_fine: false,
            ..LendingPolicy::default()
        };
        assert!(can_borrow(&lenient, &member, &book(), &refs, now()).is_allowed());
    }

    #[test]
    fn test_can_renew_until_cap() {
        let policy = LendingPolicy::default();
        let member = member(MembershipTier::Standard);
        let mut loan = loan_for(&member, now());

        for _ in 0..DEFAULT_RENEWAL_CAP {
            assert!(can_renew(&policy, &loan, &member, now()).is_allowed());
            loan.renew(loan.due_date() + Duration::days(14), DEFAULT_RENEWAL_CAP, now())
                .unwrap();
        }

        assert_eq!(
            can_renew(&policy, &loan, &member, now()),
            Decision::Denied(DenialReason::RenewalCapReached {
                tier: MembershipTier::Standard,
                cap: DEFAULT_RENEWAL_CAP
            })
        );
    }

    #[test]
    fn test_can_renew_denies_closed_and_fined_loans() {
        let policy = LendingPolicy::default();
        let member = member(MembershipTier::Standard);
        let mut loan = loan_for(&member, now());
        loan.complete(20_000, now()).unwrap();

        assert_eq!(
            can_renew(&policy, &loan, &member, now()),
            Decision::Denied(DenialReason::NotRenewable {
                state: TransactionState::Completed
            })
        );
    }

    #[test]
    fn test_can_renew_allows_lapsed_loan_without_accrued_fine() {
        let policy = LendingPolicy::default();
        let member = member(MembershipTier::Student);
        let loan = loan_for(&member, now());
        let lapsed = loan.due_date() + Duration::hours(5);

        assert!(loan.is_overdue(lapsed));
        assert!(can_renew(&policy, &loan, &member, lapsed).is_allowed());
    }

    #[test]
    fn test_can_renew_denies_loan_with_accrued_fine() {
        let policy = LendingPolicy::default();
        let member = member(MembershipTier::Standard);
        let loan = loan_for(&member, now());

        assert_eq!(
            can_renew(&policy, &loan, &member, now() + Duration::days(24)),
            Decision::Denied(DenialReason::OutstandingFine { amount: 200_000 })
        );

        let fine_free = LendingPolicy {
            daily_fine_rate: 0,
            ..LendingPolicy::default()
        };
        assert!(can_renew(&fine_free, &loan, &member, now() + Duration::days(24)).is_allowed());
    }

    #[test]
    fn test_compute_fine_zero_until_due_date() {
        let policy = LendingPolicy::default();
        let loan = loan_for(&member(MembershipTier::Standard), now());

        assert_eq!(compute_fine(&policy, &loan, now()), 0);
        assert_eq!(compute_fine(&policy, &loan, loan.due_date()), 0);
        assert_eq!(
            compute_fine(&policy, &loan, loan.due_date() + Duration::hours(23)),
            0
        );
    }

    #[test]
    fn test_compute_fine_twenty_days_after_issue() {
        let policy = LendingPolicy::default();
        let loan = loan_for(&member(MembershipTier::Standard), now());

        assert_eq!(
            compute_fine(&policy, &loan, now() + Duration::days(20)),
            6 * 20_000
        );
    }

    #[test]
    fn test_compute_fine_is_monotonic_and_idempotent() {
        let policy = LendingPolicy::default();
        let loan = loan_for(&member(MembershipTier::Standard), now());

        let mut previous = 0;
        for hours in (0..24 * 60).step_by(7) {
            let as_of = now() + Duration::hours(hours);
            let fine = compute_fine(&policy, &loan, as_of);
            assert!(fine >= previous);
            assert_eq!(fine, compute_fine(&policy, &loan, as_of));
            previous = fine;
        }
    }

    #[test]
    fn test_compute_fine_respects_cap() {
        let policy = LendingPolicy {
            max_fine: Some(50_000),
            ..LendingPolicy::default()
        };
        let loan = loan_for(&member(MembershipTier::Standard), now());

        assert_eq!(
            compute_fine(&policy, &loan, now() + Duration::days(100)),
            50_000
        );
    }

    #[test]
    fn test_next_due_date_uses_loan_period() {
        let policy = LendingPolicy {
            loan_period_days: 7,
            ..LendingPolicy::default()
        };
        assert_eq!(next_due_date(&policy, now()), now() + Duration::days(7));
    }

    #[test]
    fn test_next_due_date_saturates_on_huge_period() {
        for days in [200_000_000_000_000, i64::MAX, MAX_LOAN_PERIOD_DAYS * 1_000_000] {
            let policy = LendingPolicy {
                loan_period_days: days,
                ..LendingPolicy::default()
            };
            assert_eq!(next_due_date(&policy, now()), DateTime::<Utc>::MAX_UTC);
        }

        let longest = LendingPolicy {
            loan_period_days: MAX_LOAN_PERIOD_DAYS,
            ..LendingPolicy::default()
        };
        assert_eq!(
            next_due_date(&longest, now()),
            now() + Duration::days(MAX_LOAN_PERIOD_DAYS)
        );
    }

    #[test]
    fn test_days_overdue() {
        let loan = loan_for(&member(MembershipTier::Standard), now());
        assert_eq!(days_overdue(&loan, now()), 0);
        assert_eq!(days_overdue(&loan, now() + Duration::days(17)), 3);
    }
}
