use chrono::Duration;
use rusty_library_lending::adapters::{FormatValidator, JsonFileSnapshotStore};
use rusty_library_lending::application::{ServiceDependencies, catalog, lending};
use rusty_library_lending::domain::commands::{BorrowBook, RenewLoan, ReturnBook};
use rusty_library_lending::domain::policy::LendingPolicy;
use rusty_library_lending::domain::{BookStatus, MembershipTier, StaffId};
use rusty_library_lending::ports::{SNAPSHOT_VERSION, SnapshotStore};
use rusty_library_lending::repository::{self, Repository, RepositoryError};
use std::fs;
use std::path::Path;
use std::sync::Arc;

mod common;
use common::{base_time, new_book, new_member};

fn open_library(dir: &Path) -> ServiceDependencies {
    let store = Arc::new(JsonFileSnapshotStore::in_dir(dir));
    let repository = Repository::open(store).expect("Failed to open repository");
    ServiceDependencies::new(
        repository.shared(),
        LendingPolicy::default(),
        Arc::new(FormatValidator::new()),
    )
}

/// 書籍・会員・取引を一通り作る
fn populate(deps: &ServiceDependencies) {
    let now = base_time();
    let dune = catalog::add_book(deps, new_book("Dune", "9780441172719"), now).unwrap();
    let snow = catalog::add_book(deps, new_book("Snow Crash", "9780553380958"), now).unwrap();
    catalog::add_book(deps, new_book("The Dispossessed", "9780061054884"), now).unwrap();
    let member = catalog::add_member(deps, new_member("Leto", MembershipTier::Premium), now).unwrap();

    let first = lending::borrow_book(
        deps,
        BorrowBook {
            book_id: dune.id(),
            member_id: member.id(),
            borrowed_at: now,
            staff_id: StaffId::system(),
        },
    )
    .unwrap();
    lending::renew_loan(
        deps,
        RenewLoan {
            transaction_id: first.id(),
            renewed_at: now + Duration::days(7),
            staff_id: StaffId::system(),
        },
    )
    .unwrap();

    let second = lending::borrow_book(
        deps,
        BorrowBook {
            book_id: snow.id(),
            member_id: member.id(),
            borrowed_at: now,
            staff_id: StaffId::system(),
        },
    )
    .unwrap();
    lending::return_book(
        deps,
        ReturnBook {
            transaction_id: second.id(),
            returned_at: now + Duration::days(18),
            staff_id: StaffId::system(),
        },
    )
    .unwrap();
}

#[test]
fn test_reopen_reproduces_identical_state() {
    let dir = tempfile::tempdir().unwrap();
    let deps = open_library(dir.path());
    populate(&deps);
    let before = repository::lock(&deps.repository).snapshot();
    drop(deps);

    let reopened = open_library(dir.path());
    let repo = repository::lock(&reopened.repository);

    assert_eq!(repo.snapshot(), before);
    assert_eq!(repo.books().count(), 3);
    assert_eq!(repo.transactions().count(), 4);

    // 派生値の貸出数は取引から再計算される
    let member = repo.members().next().unwrap();
    assert_eq!(member.open_loans(), 1);
    let borrowed = repo
        .books()
        .filter(|b| b.status() == BookStatus::Borrowed)
        .count();
    assert_eq!(borrowed, 1);
}

#[test]
fn test_reserialization_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let deps = open_library(dir.path());
    populate(&deps);
    drop(deps);

    let path = dir.path().join("library.json");
    let first = fs::read(&path).unwrap();

    let reopened = open_library(dir.path());
    repository::lock(&reopened.repository).persist().unwrap();

    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn test_snapshot_layout() {
    let dir = tempfile::tempdir().unwrap();
    let deps = open_library(dir.path());
    populate(&deps);

    let raw = fs::read_to_string(dir.path().join("library.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(json["version"], SNAPSHOT_VERSION);
    assert_eq!(json["books"].as_array().unwrap().len(), 3);
    assert_eq!(json["members"].as_array().unwrap().len(), 1);
    assert!(json["members"][0].get("open_loans").is_none());

    let types: Vec<&str> = json["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"BORROW"));
    assert!(types.contains(&"RENEW"));
    assert!(types.contains(&"RETURN"));

    // コレクションはID順
    let ids: Vec<&str> = json["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

/// リネーム前に中断された書き込みは無視される
#[test]
fn test_interrupted_write_keeps_last_good_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let deps = open_library(dir.path());
    populate(&deps);
    let before = repository::lock(&deps.repository).snapshot();
    drop(deps);

    let store = JsonFileSnapshotStore::in_dir(dir.path());
    fs::write(store.temp_path(), b"{\"version\":1,\"books\":[{\"id\":").unwrap();

    let reopened = open_library(dir.path());
    assert_eq!(repository::lock(&reopened.repository).snapshot(), before);
    assert!(!store.temp_path().exists());
}

/// 壊れたスナップショットは空として扱わずエラーにする
#[test]
fn test_corrupt_snapshot_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("library.json"), b"{\"version\":1,\"books\":").unwrap();

    let store = Arc::new(JsonFileSnapshotStore::in_dir(dir.path()));
    let result = Repository::open(store.clone());

    assert!(matches!(result, Err(RepositoryError::Store(_))));
    // 元のファイルはそのまま残る
    assert!(store.load().is_err());
}

#[test]
fn test_unknown_version_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("library.json"),
        b"{\"version\":7,\"books\":[],\"members\":[],\"transactions\":[]}",
    )
    .unwrap();

    let store = Arc::new(JsonFileSnapshotStore::in_dir(dir.path()));

    assert!(matches!(
        Repository::open(store),
        Err(RepositoryError::UnsupportedVersion { found: 7, .. })
    ));
}
