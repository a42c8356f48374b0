#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rusty_library_lending::adapters::{FormatValidator, InMemorySnapshotStore};
use rusty_library_lending::application::ServiceDependencies;
use rusty_library_lending::domain::policy::LendingPolicy;
use rusty_library_lending::domain::{
    Book, BookCategory, BookId, ContactInfo, Member, MemberId, MembershipTier, NewBook, NewMember,
};
use rusty_library_lending::ports::SnapshotStore;
use rusty_library_lending::repository::{ChangeSet, Repository};
use std::sync::Arc;

/// テストで使う固定の基準時刻
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap()
}

pub fn new_book(title: &str, isbn: &str) -> NewBook {
    NewBook {
        title: title.to_string(),
        author: "Test Author".to_string(),
        isbn: isbn.to_string(),
        category: BookCategory::Fiction,
        ..Default::default()
    }
}

pub fn new_member(name: &str, tier: MembershipTier) -> NewMember {
    NewMember {
        name: name.to_string(),
        contact: ContactInfo::new(format!("{}@example.com", name.to_lowercase()), ""),
        tier,
        expiration_date: None,
    }
}

/// インメモリのストアを使ったテスト環境
pub struct TestLibrary {
    pub store: Arc<InMemorySnapshotStore>,
    pub deps: ServiceDependencies,
}

impl TestLibrary {
    pub fn new() -> Self {
        Self::with_policy(LendingPolicy::default())
    }

    pub fn with_policy(policy: LendingPolicy) -> Self {
        let store = Arc::new(InMemorySnapshotStore::new());
        let repository = Repository::open(store.clone() as Arc<dyn SnapshotStore>)
            .expect("Failed to open repository");
        let deps = ServiceDependencies::new(
            repository.shared(),
            policy,
            Arc::new(FormatValidator::new()),
        );
        Self { store, deps }
    }

    /// 書籍をn冊登録してIDを返す（ISBNは登録順に異なる値）
    pub fn add_books(&self, count: usize) -> Vec<BookId> {
        let mut changes = ChangeSet::new();
        let mut ids = Vec::new();
        for i in 0..count {
            let book = Book::new(
                new_book(&format!("Book {i}"), &format!("isbn-{i}")),
                base_time(),
            )
            .expect("Failed to create book");
            ids.push(book.id());
            changes = changes.put_book(book);
        }
        self.commit(changes);
        ids
    }

    pub fn add_member(&self, name: &str, tier: MembershipTier) -> MemberId {
        let member = Member::new(new_member(name, tier), base_time()).expect("Failed to create member");
        let id = member.id();
        self.commit(ChangeSet::new().put_member(member));
        id
    }

    fn commit(&self, changes: ChangeSet) {
        rusty_library_lending::repository::lock(&self.deps.repository)
            .commit(changes)
            .expect("Failed to commit fixtures");
    }
}
