use crate::domain::{
    Transaction, TransactionId, TransactionType,
    commands::*,
    policy::{self, Decision},
};
use crate::repository::{self, ChangeSet, Repository};

use crate::application::ServiceDependencies;
use super::errors::{LendingError, Result};

/// 書籍を貸し出す
///
/// ビジネスルール：
/// - 書籍・会員が存在すること
/// - `policy::can_borrow`が許可すること（書籍がAVAILABLE、会員がACTIVEかつ有効期限内、
///   区分の貸出上限未満、未払い罰金なし）
///
/// 書籍のBORROWED化、会員の貸出数加算、貸出レコードの追加は一括で確定する。
///
/// # 引数
/// * `deps` - サービスの依存関係
/// * `cmd` - 貸出コマンド
///
/// # 戻り値
/// 作成された貸出レコード（PENDING、返却期限 = 貸出日時 + 貸出期間）
pub fn borrow_book(deps: &ServiceDependencies, cmd: BorrowBook) -> Result<Transaction> {
    let mut repo = repository::lock(&deps.repository);

    // 1. 書籍と会員を取得
    let mut book = repo
        .book(cmd.book_id)
        .cloned()
        .ok_or_else(|| LendingError::NotFound(format!("book {}", cmd.book_id)))?;
    let mut member = repo
        .member(cmd.member_id)
        .cloned()
        .ok_or_else(|| LendingError::NotFound(format!("member {}", cmd.member_id)))?;

    // 2. ポリシー判定
    let member_loans = repo.transactions_for_member(member.id());
    let decision = policy::can_borrow(&deps.policy, &member, &book, &member_loans, cmd.borrowed_at);
    if let Decision::Denied(reason) = decision {
        tracing::warn!(
            book_id = %cmd.book_id,
            member_id = %cmd.member_id,
            "Borrow denied: {}",
            reason
        );
        return Err(LendingError::PolicyViolation(reason));
    }

    // 3. ドメインの状態を更新
    book.mark_borrowed(cmd.borrowed_at)?;
    member.record_borrow();
    let due_date = policy::next_due_date(&deps.policy, cmd.borrowed_at);
    let loan = Transaction::open_borrow(
        book.id(),
        member.id(),
        cmd.borrowed_at,
        due_date,
        cmd.staff_id,
    );

    // 4. 一括で確定
    repo.commit(
        ChangeSet::new()
            .put_book(book)
            .put_member(member)
            .put_transaction(loan.clone()),
    )?;

    tracing::info!(
        transaction_id = %loan.id(),
        book_id = %loan.book_id(),
        member_id = %loan.member_id(),
        due_date = %loan.due_date(),
        "Book borrowed"
    );

    Ok(loan)
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - 貸出が存在し、終了済み（COMPLETED / CANCELLED）でないこと
/// - 延滞していても返却は受け付け、その時点の延滞料を貸出レコードに確定する
///
/// 確定した罰金は返却後も`pay_fine`で支払える。
///
/// # 戻り値
/// 更新後の貸出レコード（COMPLETED）
pub fn return_book(deps: &ServiceDependencies, cmd: ReturnBook) -> Result<Transaction> {
    let mut repo = repository::lock(&deps.repository);

    // 1. 未終了の貸出を取得
    let mut loan = load_open_loan(&repo, cmd.transaction_id)?;

    // 2. 延滞料を確定して完了
    let fine = policy::compute_fine(&deps.policy, &loan, cmd.returned_at);
    loan.complete(fine, cmd.returned_at)?;

    // 3. 書籍と会員を戻す
    let mut book = repo
        .book(loan.book_id())
        .cloned()
        .ok_or_else(|| LendingError::NotFound(format!("book {}", loan.book_id())))?;
    book.mark_returned(cmd.returned_at)?;

    let mut member = repo
        .member(loan.member_id())
        .cloned()
        .ok_or_else(|| LendingError::NotFound(format!("member {}", loan.member_id())))?;
    member.record_release();

    let receipt = Transaction::follow_up(
        &loan,
        TransactionType::Return,
        cmd.returned_at,
        fine,
        cmd.staff_id,
    );

    // 4. 一括で確定
    repo.commit(
        ChangeSet::new()
            .put_book(book)
            .put_member(member)
            .put_transaction(loan.clone())
            .put_transaction(receipt),
    )?;

    tracing::info!(
        transaction_id = %loan.id(),
        book_id = %loan.book_id(),
        fine,
        "Book returned"
    );

    Ok(loan)
}

/// 貸出を延長する
///
/// ビジネスルール：
/// - 貸出が存在し、終了済みでないこと
/// - `policy::can_renew`が許可すること（延長回数が区分の上限未満、延滞料が発生していない）
///
/// 新しい返却期限は延長した時点 + 貸出期間。延滞中の貸出もPENDINGに戻る。
pub fn renew_loan(deps: &ServiceDependencies, cmd: RenewLoan) -> Result<Transaction> {
    let mut repo = repository::lock(&deps.repository);

    // 1. 未終了の貸出と会員を取得
    let mut loan = load_open_loan(&repo, cmd.transaction_id)?;
    let member = repo
        .member(loan.member_id())
        .ok_or_else(|| LendingError::NotFound(format!("member {}", loan.member_id())))?;

    // 2. ポリシー判定
    let decision = policy::can_renew(&deps.policy, &loan, member, cmd.renewed_at);
    if let Decision::Denied(reason) = decision {
        tracing::warn!(transaction_id = %loan.id(), "Renewal denied: {}", reason);
        return Err(LendingError::PolicyViolation(reason));
    }
    let cap = deps.policy.tier(member.tier()).renewal_cap;

    // 3. 返却期限を更新
    let due_date = policy::next_due_date(&deps.policy, cmd.renewed_at);
    loan.renew(due_date, cap, cmd.renewed_at)?;

    let receipt = Transaction::follow_up(
        &loan,
        TransactionType::Renew,
        cmd.renewed_at,
        0,
        cmd.staff_id,
    );

    // 4. 一括で確定
    repo.commit(
        ChangeSet::new()
            .put_transaction(loan.clone())
            .put_transaction(receipt),
    )?;

    tracing::info!(
        transaction_id = %loan.id(),
        renewal_count = loan.renewal_count().value(),
        due_date = %loan.due_date(),
        "Loan renewed"
    );

    Ok(loan)
}

/// 確定済みの延滞料を支払う
///
/// 全額払いのみ。金額が未払い額と一致しない場合や未払いがない場合はInvalidState。
/// 返却済みの貸出に対しても行える（終了後に許される唯一の変更）。
pub fn pay_fine(deps: &ServiceDependencies, cmd: PayFine) -> Result<Transaction> {
    let mut repo = repository::lock(&deps.repository);

    let mut loan = load_transaction(&repo, cmd.transaction_id)?;
    if !loan.is_borrow() {
        return Err(LendingError::InvalidState(format!(
            "transaction {} is a {} record, fines are paid on the borrow",
            loan.id(),
            loan.transaction_type()
        )));
    }

    let outstanding = loan.fine_amount();
    if outstanding == 0 {
        return Err(LendingError::InvalidState(format!(
            "transaction {} has no outstanding fine",
            loan.id()
        )));
    }
    if cmd.amount != outstanding {
        return Err(LendingError::InvalidState(format!(
            "payment of {} does not match outstanding fine of {}",
            cmd.amount, outstanding
        )));
    }

    let paid = loan.settle_fine(cmd.paid_at)?;
    let receipt = Transaction::follow_up(
        &loan,
        TransactionType::FinePayment,
        cmd.paid_at,
        paid,
        cmd.staff_id,
    );

    repo.commit(
        ChangeSet::new()
            .put_transaction(loan.clone())
            .put_transaction(receipt),
    )?;

    tracing::info!(transaction_id = %loan.id(), amount = paid, "Fine paid");

    Ok(loan)
}

/// 貸出を取り消す（管理操作）
///
/// 罰金は計算しない。書籍はAVAILABLEに戻り、会員の貸出数も減る。
pub fn cancel_loan(deps: &ServiceDependencies, cmd: CancelLoan) -> Result<Transaction> {
    let mut repo = repository::lock(&deps.repository);

    let mut loan = load_open_loan(&repo, cmd.transaction_id)?;
    loan.cancel(cmd.cancelled_at)?;

    let mut book = repo
        .book(loan.book_id())
        .cloned()
        .ok_or_else(|| LendingError::NotFound(format!("book {}", loan.book_id())))?;
    book.mark_returned(cmd.cancelled_at)?;

    let mut member = repo
        .member(loan.member_id())
        .cloned()
        .ok_or_else(|| LendingError::NotFound(format!("member {}", loan.member_id())))?;
    member.record_release();

    repo.commit(
        ChangeSet::new()
            .put_book(book)
            .put_member(member)
            .put_transaction(loan.clone()),
    )?;

    tracing::info!(
        transaction_id = %loan.id(),
        staff_id = %cmd.staff_id,
        "Loan cancelled"
    );

    Ok(loan)
}

/// 取引を1件取得する
pub fn get_transaction(deps: &ServiceDependencies, id: TransactionId) -> Result<Transaction> {
    let repo = repository::lock(&deps.repository);
    load_transaction(&repo, id)
}

/// 貸出とその後続レコード（返却・延長・支払い）を発生順に返す
pub fn loan_history(deps: &ServiceDependencies, id: TransactionId) -> Result<Vec<Transaction>> {
    let repo = repository::lock(&deps.repository);
    let loan = load_transaction(&repo, id)?;

    let mut history: Vec<Transaction> = repo
        .transactions()
        .filter(|t| t.id() == loan.id() || t.parent_id() == Some(loan.id()))
        .cloned()
        .collect();
    history.sort_by_key(|t| (t.issued_at(), t.parent_id().is_some(), t.id()));

    Ok(history)
}

fn load_transaction(repo: &Repository, id: TransactionId) -> Result<Transaction> {
    repo.transaction(id)
        .cloned()
        .ok_or_else(|| LendingError::NotFound(format!("transaction {id}")))
}

/// 未終了の貸出レコードを取得するヘルパー関数
///
/// return / renew / cancelで共通利用される。
fn load_open_loan(repo: &Repository, id: TransactionId) -> Result<Transaction> {
    let loan = load_transaction(repo, id)?;

    if !loan.is_borrow() {
        return Err(LendingError::InvalidState(format!(
            "transaction {id} is a {} record, not a borrow",
            loan.transaction_type()
        )));
    }
    if loan.state().is_terminal() {
        return Err(LendingError::InvalidState(format!(
            "transaction {id} is already {}",
            loan.state()
        )));
    }

    Ok(loan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FormatValidator, InMemorySnapshotStore};
    use crate::domain::{
        BookCategory, BookId, BookStatus, ContactInfo, MemberId, NewBook, NewMember, StaffId,
        TransactionState, policy::{DenialReason, LendingPolicy},
    };
    use crate::domain::{Book, Member};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap()
    }

    fn setup() -> (Arc<InMemorySnapshotStore>, ServiceDependencies, BookId, MemberId) {
        let store = Arc::new(InMemorySnapshotStore::new());
        let mut repo = Repository::open(store.clone()).unwrap();

        let book = Book::new(
            NewBook {
                title: "Snow Crash".to_string(),
                author: "Neal Stephenson".to_string(),
                isbn: "9780553380958".to_string(),
                category: BookCategory::Fiction,
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        let member = Member::new(
            NewMember {
                name: "Hiro Protagonist".to_string(),
                contact: ContactInfo::new("hiro@metaverse.example", ""),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        let (book_id, member_id) = (book.id(), member.id());
        repo.commit(ChangeSet::new().put_book(book).put_member(member))
            .unwrap();

        let deps = ServiceDependencies::new(
            repo.shared(),
            LendingPolicy::default(),
            Arc::new(FormatValidator::new()),
        );
        (store, deps, book_id, member_id)
    }

    fn borrow(deps: &ServiceDependencies, book_id: BookId, member_id: MemberId) -> Transaction {
        borrow_book(
            deps,
            BorrowBook {
                book_id,
                member_id,
                borrowed_at: now(),
                staff_id: StaffId::system(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_borrow_book_updates_all_three_records() {
        let (store, deps, book_id, member_id) = setup();

        let loan = borrow(&deps, book_id, member_id);

        assert_eq!(loan.due_date(), now() + Duration::days(14));
        let repo = repository::lock(&deps.repository);
        assert_eq!(repo.book(book_id).unwrap().status(), BookStatus::Borrowed);
        assert_eq!(repo.member(member_id).unwrap().open_loans(), 1);
        assert_eq!(repo.open_loan_for_book(book_id).map(|t| t.id()), Some(loan.id()));
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn test_borrow_unknown_book_is_not_found() {
        let (_, deps, _, member_id) = setup();

        let result = borrow_book(
            &deps,
            BorrowBook {
                book_id: BookId::new(),
                member_id,
                borrowed_at: now(),
                staff_id: StaffId::system(),
            },
        );

        assert!(matches!(result, Err(LendingError::NotFound(_))));
    }

    #[test]
    fn test_return_locks_fine_and_appends_receipt() {
        let (_, deps, book_id, member_id) = setup();
        let loan = borrow(&deps, book_id, member_id);

        let returned = return_book(
            &deps,
            ReturnBook {
                transaction_id: loan.id(),
                returned_at: now() + Duration::days(20),
                staff_id: StaffId::system(),
            },
        )
        .unwrap();

        assert_eq!(returned.state(), TransactionState::Completed);
        assert_eq!(returned.fine_amount(), 120_000);

        let history = loan_history(&deps, loan.id()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].transaction_type(), TransactionType::Return);
        assert_eq!(history[1].fine_amount(), 120_000);
    }

    #[test]
    fn test_second_return_is_invalid_state() {
        let (_, deps, book_id, member_id) = setup();
        let loan = borrow(&deps, book_id, member_id);
        let cmd = ReturnBook {
            transaction_id: loan.id(),
            returned_at: now() + Duration::days(1),
            staff_id: StaffId::system(),
        };

        return_book(&deps, cmd.clone()).unwrap();
        let result = return_book(&deps, cmd);

        assert!(matches!(result, Err(LendingError::InvalidState(_))));
        let repo = repository::lock(&deps.repository);
        assert_eq!(repo.member(member_id).unwrap().open_loans(), 0);
    }

    #[test]
    fn test_renew_lapsed_loan_resets_due_date() {
        let (_, deps, book_id, member_id) = setup();
        let loan = borrow(&deps, book_id, member_id);
        let renewed_at = now() + Duration::days(14) + Duration::hours(6);
        assert!(loan.is_overdue(renewed_at));

        let renewed = renew_loan(
            &deps,
            RenewLoan {
                transaction_id: loan.id(),
                renewed_at,
                staff_id: StaffId::system(),
            },
        )
        .unwrap();

        assert_eq!(renewed.due_date(), renewed_at + Duration::days(14));
        assert_eq!(renewed.renewal_count().value(), 1);
        assert_eq!(renewed.effective_state(renewed_at), TransactionState::Pending);
    }

    #[test]
    fn test_renew_with_accrued_fine_is_denied() {
        let (store, deps, book_id, member_id) = setup();
        let loan = borrow(&deps, book_id, member_id);
        let saves = store.save_count();

        let result = renew_loan(
            &deps,
            RenewLoan {
                transaction_id: loan.id(),
                renewed_at: now() + Duration::days(24),
                staff_id: StaffId::system(),
            },
        );

        assert!(matches!(
            result,
            Err(LendingError::PolicyViolation(DenialReason::OutstandingFine {
                amount: 200_000
            }))
        ));
        assert_eq!(store.save_count(), saves);
        assert_eq!(get_transaction(&deps, loan.id()).unwrap().due_date(), loan.due_date());
    }

    #[test]
    fn test_pay_fine_requires_exact_amount() {
        let (_, deps, book_id, member_id) = setup();
        let loan = borrow(&deps, book_id, member_id);
        return_book(
            &deps,
            ReturnBook {
                transaction_id: loan.id(),
                returned_at: now() + Duration::days(16),
                staff_id: StaffId::system(),
            },
        )
        .unwrap();

        let wrong = pay_fine(
            &deps,
            PayFine {
                transaction_id: loan.id(),
                amount: 10_000,
                paid_at: now() + Duration::days(17),
                staff_id: StaffId::system(),
            },
        );
        assert!(matches!(wrong, Err(LendingError::InvalidState(_))));

        let paid = pay_fine(
            &deps,
            PayFine {
                transaction_id: loan.id(),
                amount: 40_000,
                paid_at: now() + Duration::days(17),
                staff_id: StaffId::system(),
            },
        )
        .unwrap();
        assert_eq!(paid.fine_amount(), 0);
        assert_eq!(paid.state(), TransactionState::Completed);
    }

    #[test]
    fn test_cancel_releases_book() {
        let (_, deps, book_id, member_id) = setup();
        let loan = borrow(&deps, book_id, member_id);

        let cancelled = cancel_loan(
            &deps,
            CancelLoan {
                transaction_id: loan.id(),
                cancelled_at: now() + Duration::hours(1),
                staff_id: StaffId::system(),
            },
        )
        .unwrap();

        assert_eq!(cancelled.state(), TransactionState::Cancelled);
        let repo = repository::lock(&deps.repository);
        assert_eq!(repo.book(book_id).unwrap().status(), BookStatus::Available);
        assert_eq!(repo.member(member_id).unwrap().open_loans(), 0);
    }

    #[test]
    fn test_failed_persist_leaves_state_untouched() {
        let (store, deps, book_id, member_id) = setup();
        store.set_fail_saves(true);

        let result = borrow_book(
            &deps,
            BorrowBook {
                book_id,
                member_id,
                borrowed_at: now(),
                staff_id: StaffId::system(),
            },
        );

        assert!(matches!(result, Err(LendingError::PersistenceFailure(_))));
        let repo = repository::lock(&deps.repository);
        assert_eq!(repo.book(book_id).unwrap().status(), BookStatus::Available);
        assert_eq!(repo.member(member_id).unwrap().open_loans(), 0);
        assert_eq!(repo.transactions().count(), 0);
    }

    #[test]
    fn test_borrow_denied_for_unavailable_book() {
        let (_, deps, book_id, member_id) = setup();
        borrow(&deps, book_id, member_id);

        let result = borrow_book(
            &deps,
            BorrowBook {
                book_id,
                member_id,
                borrowed_at: now(),
                staff_id: StaffId::system(),
            },
        );

        assert!(matches!(
            result,
            Err(LendingError::PolicyViolation(DenialReason::BookUnavailable { .. }))
        ));
    }
}
