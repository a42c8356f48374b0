//! 書籍・会員・取引を保持するリポジトリ
//!
//! 3つのコレクションをIDをキーとしたHashMapでメモリ上に持ち、
//! 変更を確定するたびにスナップショット全体を`SnapshotStore`へ書き出す。

mod change_set;
mod errors;

pub use change_set::ChangeSet;
pub use errors::{RepositoryError, Result};

use crate::domain::{Book, BookId, Member, MemberId, Transaction, TransactionId};
use crate::ports::{SNAPSHOT_VERSION, Snapshot, SnapshotStore};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// サービス間で共有するリポジトリ
///
/// 各サービス操作は読み取り→判定→書き込み→永続化の間ロックを保持する。
pub type SharedRepository = Arc<Mutex<Repository>>;

/// ロックを取得する
///
/// 保持中のパニックでポイズンされていても中身をそのまま使う。
/// 変更は`commit`で一括適用されるため、途中状態は残らない。
pub fn lock(repository: &SharedRepository) -> MutexGuard<'_, Repository> {
    repository.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Repository {
    store: Arc<dyn SnapshotStore>,
    books: HashMap<BookId, Book>,
    members: HashMap<MemberId, Member>,
    transactions: HashMap<TransactionId, Transaction>,
}

impl Repository {
    /// ストアから最後のスナップショットを読み込んでリポジトリを構築する
    ///
    /// スナップショットがなければ空の状態から始める。
    /// 会員の未終了貸出数はここで取引から再計算する。
    pub fn open(store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let snapshot = store.load().map_err(RepositoryError::Store)?;

        let mut repository = Self {
            store,
            books: HashMap::new(),
            members: HashMap::new(),
            transactions: HashMap::new(),
        };

        if let Some(snapshot) = snapshot {
            repository.restore(snapshot)?;
        }

        tracing::info!(
            books = repository.books.len(),
            members = repository.members.len(),
            transactions = repository.transactions.len(),
            "Repository opened"
        );

        Ok(repository)
    }

    /// 共有用に包んだリポジトリを作る
    pub fn shared(self) -> SharedRepository {
        Arc::new(Mutex::new(self))
    }

    fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RepositoryError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        for book in snapshot.books {
            let id = book.id();
            if self.books.insert(id, book).is_some() {
                return Err(RepositoryError::Inconsistent(format!("duplicate book id {id}")));
            }
        }

        for member in snapshot.members {
            let id = member.id();
            if self.members.insert(id, member).is_some() {
                return Err(RepositoryError::Inconsistent(format!("duplicate member id {id}")));
            }
        }

        for transaction in snapshot.transactions {
            let id = transaction.id();
            if !self.books.contains_key(&transaction.book_id()) {
                return Err(RepositoryError::Inconsistent(format!(
                    "transaction {id} references unknown book {}",
                    transaction.book_id()
                )));
            }
            if !self.members.contains_key(&transaction.member_id()) {
                return Err(RepositoryError::Inconsistent(format!(
                    "transaction {id} references unknown member {}",
                    transaction.member_id()
                )));
            }
            if self.transactions.insert(id, transaction).is_some() {
                return Err(RepositoryError::Inconsistent(format!(
                    "duplicate transaction id {id}"
                )));
            }
        }

        self.recount_open_loans();
        Ok(())
    }

    fn recount_open_loans(&mut self) {
        let mut counts: HashMap<MemberId, u32> = HashMap::new();
        for transaction in self.transactions.values().filter(|t| t.is_open()) {
            *counts.entry(transaction.member_id()).or_default() += 1;
        }
        for (id, member) in self.members.iter_mut() {
            member.set_open_loans(counts.get(id).copied().unwrap_or(0));
        }
    }

    // ---- 参照 ----

    pub fn book(&self, id: BookId) -> Option<&Book> {
        self.books.get(&id)
    }

    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// 会員に関係する取引（後続レコードを含む）
    pub fn transactions_for_member(&self, member_id: MemberId) -> Vec<&Transaction> {
        self.transactions
            .values()
            .filter(|t| t.member_id() == member_id)
            .collect()
    }

    /// 書籍に関係する取引（後続レコードを含む）
    pub fn transactions_for_book(&self, book_id: BookId) -> Vec<&Transaction> {
        self.transactions
            .values()
            .filter(|t| t.book_id() == book_id)
            .collect()
    }

    /// 書籍を参照している未終了の貸出
    pub fn open_loan_for_book(&self, book_id: BookId) -> Option<&Transaction> {
        self.transactions
            .values()
            .find(|t| t.book_id() == book_id && t.is_open())
    }

    /// ISBNで書籍を探す（ハイフン・空白・大文字小文字を無視）
    pub fn find_book_by_isbn(&self, isbn: &str) -> Option<&Book> {
        let wanted = normalize_isbn(isbn);
        self.books
            .values()
            .find(|book| normalize_isbn(book.isbn()) == wanted)
    }

    // ---- 単体の更新 ----

    pub fn put_book(&mut self, book: Book) -> Result<()> {
        self.commit(ChangeSet::new().put_book(book))
    }

    pub fn put_member(&mut self, member: Member) -> Result<()> {
        self.commit(ChangeSet::new().put_member(member))
    }

    pub fn put_transaction(&mut self, transaction: Transaction) -> Result<()> {
        self.commit(ChangeSet::new().put_transaction(transaction))
    }

    pub fn remove_book(&mut self, id: BookId) -> Result<()> {
        self.commit(ChangeSet::new().remove_book(id))
    }

    pub fn remove_member(&mut self, id: MemberId) -> Result<()> {
        self.commit(ChangeSet::new().remove_member(id))
    }

    /// 変更をまとめて適用し、永続化する
    ///
    /// 永続化に失敗した場合はメモリ上の値を適用前に戻してからエラーを返す。
    /// 呼び出し側から見て、変更は全部反映されるか全く反映されないかのどちらか。
    pub fn commit(&mut self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let undo = self.apply(changes);

        if let Err(err) = self.persist() {
            tracing::error!("Persisting changes failed, rolling back: {}", err);
            self.revert(undo);
            return Err(err);
        }

        Ok(())
    }

    /// 現在の状態をスナップショットとして書き出す
    pub fn persist(&self) -> Result<()> {
        self.store
            .save(&self.snapshot())
            .map_err(RepositoryError::Store)
    }

    /// 現在の状態のスナップショット（各コレクションはID順）
    pub fn snapshot(&self) -> Snapshot {
        let mut books: Vec<Book> = self.books.values().cloned().collect();
        books.sort_by_key(|book| book.id());

        let mut members: Vec<Member> = self.members.values().cloned().collect();
        members.sort_by_key(|member| member.id());

        let mut transactions: Vec<Transaction> = self.transactions.values().cloned().collect();
        transactions.sort_by_key(|transaction| transaction.id());

        Snapshot {
            version: SNAPSHOT_VERSION,
            books,
            members,
            transactions,
        }
    }

    fn apply(&mut self, changes: ChangeSet) -> Undo {
        let mut undo = Undo::default();
        let mut seen_books = HashSet::new();
        let mut seen_members = HashSet::new();
        let mut seen_transactions = HashSet::new();

        for book in changes.books {
            let id = book.id();
            let previous = self.books.insert(id, book);
            if seen_books.insert(id) {
                undo.books.push((id, previous));
            }
        }
        for id in changes.removed_books {
            let previous = self.books.remove(&id);
            if seen_books.insert(id) {
                undo.books.push((id, previous));
            }
        }

        for member in changes.members {
            let id = member.id();
            let previous = self.members.insert(id, member);
            if seen_members.insert(id) {
                undo.members.push((id, previous));
            }
        }
        for id in changes.removed_members {
            let previous = self.members.remove(&id);
            if seen_members.insert(id) {
                undo.members.push((id, previous));
            }
        }

        for transaction in changes.transactions {
            let id = transaction.id();
            let previous = self.transactions.insert(id, transaction);
            if seen_transactions.insert(id) {
                undo.transactions.push((id, previous));
            }
        }

        undo
    }

    fn revert(&mut self, undo: Undo) {
        for (id, previous) in undo.books {
            restore_entry(&mut self.books, id, previous);
        }
        for (id, previous) in undo.members {
            restore_entry(&mut self.members, id, previous);
        }
        for (id, previous) in undo.transactions {
            restore_entry(&mut self.transactions, id, previous);
        }
    }
}

/// 適用前の値（Noneは「存在しなかった」）
#[derive(Default)]
struct Undo {
    books: Vec<(BookId, Option<Book>)>,
    members: Vec<(MemberId, Option<Member>)>,
    transactions: Vec<(TransactionId, Option<Transaction>)>,
}

fn restore_entry<K, V>(map: &mut HashMap<K, V>, id: K, previous: Option<V>)
where
    K: std::hash::Hash + Eq,
{
    match previous {
        Some(value) => {
            map.insert(id, value);
        }
        None => {
            map.remove(&id);
        }
    }
}

fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySnapshotStore;
    use crate::domain::{
        BookCategory, ContactInfo, NewBook, NewMember, StaffId, TransactionType,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn book(isbn: &str) -> Book {
        Book::new(
            NewBook {
                title: "The Left Hand of Darkness".to_string(),
                author: "Ursula K. Le Guin".to_string(),
                isbn: isbn.to_string(),
                category: BookCategory::Fiction,
                ..Default::default()
            },
            now(),
        )
        .unwrap()
    }

    fn member() -> Member {
        Member::new(
            NewMember {
                name: "Genly Ai".to_string(),
                contact: ContactInfo::new("genly@ekumen.example", ""),
                ..Default::default()
            },
            now(),
        )
        .unwrap()
    }

    fn setup() -> (Arc<InMemorySnapshotStore>, Repository) {
        let store = Arc::new(InMemorySnapshotStore::new());
        let repository = Repository::open(store.clone()).unwrap();
        (store, repository)
    }

    #[test]
    fn test_open_empty_store() {
        let (store, repository) = setup();

        assert_eq!(repository.books().count(), 0);
        assert_eq!(repository.snapshot(), Snapshot::empty());
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_commit_persists_batch() {
        let (store, mut repository) = setup();
        let book = book("9780441478125");
        let member = member();
        let book_id = book.id();

        repository
            .commit(ChangeSet::new().put_book(book).put_member(member))
            .unwrap();

        assert_eq!(store.save_count(), 1);
        let reopened = Repository::open(store.clone()).unwrap();
        assert!(reopened.book(book_id).is_some());
        assert_eq!(reopened.members().count(), 1);
    }

    #[test]
    fn test_failed_persist_rolls_back_batch() {
        let (store, mut repository) = setup();
        let mut book = book("9780441478125");
        let book_id = book.id();
        repository.put_book(book.clone()).unwrap();
        let before = repository.snapshot();

        store.set_fail_saves(true);
        book.set_title("Changed", now() + Duration::hours(1)).unwrap();
        let result = repository.commit(
            ChangeSet::new()
                .put_book(book)
                .put_member(member())
                .remove_book(book_id),
        );

        assert!(matches!(result, Err(RepositoryError::Store(_))));
        assert_eq!(repository.snapshot(), before);
        assert_eq!(
            repository.book(book_id).map(|b| b.title().to_string()),
            Some("The Left Hand of Darkness".to_string())
        );
    }

    #[test]
    fn test_open_recounts_open_loans() {
        let (store, mut repository) = setup();
        let book_a = book("9780441478125");
        let book_b = book("9780441172719");
        let member = member();

        let open = Transaction::open_borrow(
            book_a.id(),
            member.id(),
            now(),
            now() + Duration::days(14),
            StaffId::system(),
        );
        let mut closed = Transaction::open_borrow(
            book_b.id(),
            member.id(),
            now(),
            now() + Duration::days(14),
            StaffId::system(),
        );
        closed.complete(0, now() + Duration::days(1)).unwrap();
        let receipt = Transaction::follow_up(
            &closed,
            TransactionType::Return,
            now() + Duration::days(1),
            0,
            StaffId::system(),
        );

        let member_id = member.id();
        repository
            .commit(
                ChangeSet::new()
                    .put_book(book_a)
                    .put_book(book_b)
                    .put_member(member)
                    .put_transaction(open)
                    .put_transaction(closed)
                    .put_transaction(receipt),
            )
            .unwrap();

        let reopened = Repository::open(store).unwrap();
        assert_eq!(reopened.member(member_id).unwrap().open_loans(), 1);
        assert_eq!(reopened.transactions_for_member(member_id).len(), 3);
    }

    #[test]
    fn test_snapshot_reserialization_is_byte_stable() {
        let (store, mut repository) = setup();
        for isbn in ["9780441478125", "9780441172719", "0441172717"] {
            repository.put_book(book(isbn)).unwrap();
        }
        repository.put_member(member()).unwrap();
        let first = store.saved_json().unwrap();

        let reopened = Repository::open(store.clone()).unwrap();
        reopened.persist().unwrap();

        assert_eq!(store.saved_json().unwrap(), first);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut snapshot = Snapshot::empty();
        snapshot.version = 2;
        let store = Arc::new(InMemorySnapshotStore::with_snapshot(&snapshot).unwrap());

        assert!(matches!(
            Repository::open(store),
            Err(RepositoryError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_rejects_dangling_transaction() {
        let member = member();
        let loan = Transaction::open_borrow(
            BookId::new(),
            member.id(),
            now(),
            now() + Duration::days(14),
            StaffId::system(),
        );
        let snapshot = Snapshot {
            members: vec![member],
            transactions: vec![loan],
            ..Snapshot::empty()
        };
        let store = Arc::new(InMemorySnapshotStore::with_snapshot(&snapshot).unwrap());

        assert!(matches!(
            Repository::open(store),
            Err(RepositoryError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_find_book_by_isbn_ignores_formatting() {
        let (_, mut repository) = setup();
        let book = book("9780441478125");
        let id = book.id();
        repository.put_book(book).unwrap();

        assert_eq!(
            repository.find_book_by_isbn("978-0-441-47812-5").map(|b| b.id()),
            Some(id)
        );
        assert!(repository.find_book_by_isbn("9780441172719").is_none());
    }

    #[test]
    fn test_open_loan_for_book() {
        let (_, mut repository) = setup();
        let book = book("9780441478125");
        let member = member();
        let loan = Transaction::open_borrow(
            book.id(),
            member.id(),
            now(),
            now() + Duration::days(14),
            StaffId::system(),
        );
        let (book_id, loan_id) = (book.id(), loan.id());
        repository
            .commit(
                ChangeSet::new()
                    .put_book(book)
                    .put_member(member)
                    .put_transaction(loan),
            )
            .unwrap();

        assert_eq!(
            repository.open_loan_for_book(book_id).map(|t| t.id()),
            Some(loan_id)
        );
        assert_eq!(repository.transactions_for_book(book_id).len(), 1);
    }
}
