use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::application::ServiceDependencies;
use crate::domain::{
    Book, BookCategory, BookId, BookStatus, ContactInfo, Member, MemberId, MemberStatus,
    MembershipTier, NewBook, NewMember, Searchable,
};
use crate::ports::FieldValidator;
use crate::repository::{self, ChangeSet, Repository};

use super::errors::{CatalogError, Result};

/// 書籍情報の部分更新（Noneの項目は変更しない）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<BookCategory>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
}

/// 会員情報の部分更新（Noneの項目は変更しない）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemberUpdate {
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub tier: Option<MembershipTier>,
}

/// 書籍検索の条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookQuery {
    #[serde(default, rename = "q")]
    pub query: String,
    pub category: Option<BookCategory>,
    pub status: Option<BookStatus>,
    #[serde(default)]
    pub available_only: bool,
}

/// 会員検索の条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemberQuery {
    #[serde(default, rename = "q")]
    pub query: String,
    pub tier: Option<MembershipTier>,
    pub status: Option<MemberStatus>,
}

// ============================================================================
// 書籍
// ============================================================================

/// 書籍を登録する
///
/// ISBNの書式（チェックディジット）とコレクション内での一意性を確認してから作成する。
pub fn add_book(deps: &ServiceDependencies, input: NewBook, now: DateTime<Utc>) -> Result<Book> {
    let mut repo = repository::lock(&deps.repository);

    check_isbn(deps.validator.as_ref(), &repo, &input.isbn, None)?;
    let book = Book::new(input, now)?;

    repo.put_book(book.clone())?;

    tracing::info!(book_id = %book.id(), isbn = %book.isbn(), "Book added");
    Ok(book)
}

pub fn get_book(deps: &ServiceDependencies, id: BookId) -> Result<Book> {
    let repo = repository::lock(&deps.repository);
    load_book(&repo, id)
}

/// 書籍情報を更新する
///
/// すべての項目を適用してから一度だけ保存する。途中で検証に失敗した場合は何も変わらない。
pub fn update_book(
    deps: &ServiceDependencies,
    id: BookId,
    update: BookUpdate,
    now: DateTime<Utc>,
) -> Result<Book> {
    let mut repo = repository::lock(&deps.repository);
    let mut book = load_book(&repo, id)?;

    if let Some(isbn) = &update.isbn {
        check_isbn(deps.validator.as_ref(), &repo, isbn, Some(id))?;
        book.set_isbn(isbn, now)?;
    }
    if let Some(title) = &update.title {
        book.set_title(title, now)?;
    }
    if let Some(author) = &update.author {
        book.set_author(author, now)?;
    }
    if let Some(category) = update.category {
        book.set_category(category, now)?;
    }
    if let Some(publisher) = &update.publisher {
        book.set_publisher(publisher, now)?;
    }
    if let Some(year) = update.publication_year {
        book.set_publication_year(Some(year), now)?;
    }
    if let Some(description) = &update.description {
        book.set_description(description, now)?;
    }

    repo.put_book(book.clone())?;

    tracing::info!(book_id = %id, "Book updated");
    Ok(book)
}

/// 書籍のステータスを変更する（取り置き・紛失・復帰）
///
/// 貸出中の書籍には使えない。貸出・返却は貸出サービスが行う。
pub fn set_book_status(
    deps: &ServiceDependencies,
    id: BookId,
    status: BookStatus,
    now: DateTime<Utc>,
) -> Result<Book> {
    let mut repo = repository::lock(&deps.repository);
    let mut book = load_book(&repo, id)?;

    book.set_status(status, now)?;
    repo.put_book(book.clone())?;

    tracing::info!(book_id = %id, status = %status, "Book status changed");
    Ok(book)
}

/// 書籍を削除する
///
/// 取引から参照されている書籍（貸出中、または貸出履歴あり）は削除できない。
/// 除籍したい場合はLOSTにする。
pub fn remove_book(deps: &ServiceDependencies, id: BookId) -> Result<()> {
    let mut repo = repository::lock(&deps.repository);
    let book = load_book(&repo, id)?;

    if repo.open_loan_for_book(id).is_some() {
        return Err(CatalogError::InUse(format!("book {id} is currently borrowed")));
    }
    if !repo.transactions_for_book(id).is_empty() {
        return Err(CatalogError::InUse(format!(
            "book {id} has lending history; mark it LOST instead"
        )));
    }

    repo.remove_book(id)?;

    tracing::info!(book_id = %id, title = %book.title(), "Book removed");
    Ok(())
}

/// 書籍を検索する（タイトル順）
pub fn search_books(deps: &ServiceDependencies, query: &BookQuery) -> Vec<Book> {
    let repo = repository::lock(&deps.repository);

    let mut books: Vec<Book> = repo
        .books()
        .filter(|book| book.matches_search(&query.query))
        .filter(|book| query.category.is_none_or(|c| book.category() == c))
        .filter(|book| query.status.is_none_or(|s| book.status() == s))
        .filter(|book| !query.available_only || book.is_available())
        .cloned()
        .collect();
    books.sort_by(|a, b| a.title().cmp(b.title()).then(a.id().cmp(&b.id())));
    books
}

// ============================================================================
// 会員
// ============================================================================

/// 会員を登録する
///
/// 連絡先は空でなければ書式を確認する。
pub fn add_member(
    deps: &ServiceDependencies,
    input: NewMember,
    now: DateTime<Utc>,
) -> Result<Member> {
    check_contact(deps.validator.as_ref(), &input.contact)?;

    let mut repo = repository::lock(&deps.repository);
    let member = Member::new(input, now)?;
    repo.put_member(member.clone())?;

    tracing::info!(member_id = %member.id(), tier = %member.tier(), "Member added");
    Ok(member)
}

pub fn get_member(deps: &ServiceDependencies, id: MemberId) -> Result<Member> {
    let repo = repository::lock(&deps.repository);
    load_member(&repo, id)
}

/// 会員情報を更新する
///
/// 区分の変更は、未終了の貸出数が新しい区分の上限以下の場合に限る。
/// 超える場合はInvalidStateを返し、何も保存しない。
pub fn update_member(
    deps: &ServiceDependencies,
    id: MemberId,
    update: MemberUpdate,
    now: DateTime<Utc>,
) -> Result<Member> {
    if let Some(contact) = &update.contact {
        check_contact(deps.validator.as_ref(), contact)?;
    }

    let mut repo = repository::lock(&deps.repository);
    let mut member = load_member(&repo, id)?;

    if let Some(name) = &update.name {
        member.rename(name, now)?;
    }
    if let Some(contact) = update.contact {
        member.set_contact(contact, now)?;
    }
    if let Some(tier) = update.tier {
        let limit = deps.policy.tier(tier).borrow_limit;
        if member.open_loans() > limit {
            tracing::warn!(
                member_id = %id,
                open_loans = member.open_loans(),
                "Tier change to {} rejected",
                tier
            );
            return Err(CatalogError::InvalidState(format!(
                "member {id} has {} open loans, above the {tier} limit of {limit}",
                member.open_loans()
            )));
        }
        member.set_tier(tier, now)?;
    }

    repo.put_member(member.clone())?;

    tracing::info!(member_id = %id, "Member updated");
    Ok(member)
}

pub fn suspend_member(deps: &ServiceDependencies, id: MemberId, now: DateTime<Utc>) -> Result<Member> {
    let mut repo = repository::lock(&deps.repository);
    let mut member = load_member(&repo, id)?;

    member.suspend(now);
    repo.put_member(member.clone())?;

    tracing::info!(member_id = %id, "Member suspended");
    Ok(member)
}

pub fn reactivate_member(
    deps: &ServiceDependencies,
    id: MemberId,
    now: DateTime<Utc>,
) -> Result<Member> {
    let mut repo = repository::lock(&deps.repository);
    let mut member = load_member(&repo, id)?;

    member.reactivate(now)?;
    repo.put_member(member.clone())?;

    tracing::info!(member_id = %id, "Member reactivated");
    Ok(member)
}

/// 会員資格を延長する（期限切れの会員はACTIVEに戻る）
pub fn renew_membership(
    deps: &ServiceDependencies,
    id: MemberId,
    years: u32,
    now: DateTime<Utc>,
) -> Result<Member> {
    let mut repo = repository::lock(&deps.repository);
    let mut member = load_member(&repo, id)?;

    member.renew_membership(years, now)?;
    repo.put_member(member.clone())?;

    tracing::info!(
        member_id = %id,
        expiration_date = %member.expiration_date(),
        "Membership renewed"
    );
    Ok(member)
}

/// 有効期限を過ぎたACTIVEの会員をEXPIREDにする
///
/// # 戻り値
/// 状態が変わった会員のID
pub fn expire_lapsed_memberships(
    deps: &ServiceDependencies,
    now: DateTime<Utc>,
) -> Result<Vec<MemberId>> {
    let mut repo = repository::lock(&deps.repository);

    let mut changes = ChangeSet::new();
    let mut expired = Vec::new();
    for member in repo.members() {
        let mut member = member.clone();
        if member.expire_if_lapsed(now) {
            expired.push(member.id());
            changes = changes.put_member(member);
        }
    }

    repo.commit(changes)?;
    expired.sort();

    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "Lapsed memberships expired");
    }
    Ok(expired)
}

/// 会員を削除する
///
/// 貸出中の書籍や未払いの罰金がある会員、貸出履歴のある会員は削除できない。
pub fn remove_member(deps: &ServiceDependencies, id: MemberId) -> Result<()> {
    let mut repo = repository::lock(&deps.repository);
    let member = load_member(&repo, id)?;

    if member.open_loans() > 0 {
        return Err(CatalogError::InUse(format!(
            "member {id} has {} borrowed book(s)",
            member.open_loans()
        )));
    }

    let history = repo.transactions_for_member(id);
    let unpaid: u64 = history
        .iter()
        .filter(|t| t.is_borrow())
        .map(|t| t.fine_amount())
        .sum();
    if unpaid > 0 {
        return Err(CatalogError::InUse(format!(
            "member {id} has outstanding fines of {unpaid}"
        )));
    }
    if !history.is_empty() {
        return Err(CatalogError::InUse(format!(
            "member {id} has lending history; suspend the membership instead"
        )));
    }

    repo.remove_member(id)?;

    tracing::info!(member_id = %id, "Member removed");
    Ok(())
}

/// 会員を検索する（名前順）
pub fn search_members(deps: &ServiceDependencies, query: &MemberQuery) -> Vec<Member> {
    let repo = repository::lock(&deps.repository);

    let mut members: Vec<Member> = repo
        .members()
        .filter(|member| member.matches_search(&query.query))
        .filter(|member| query.tier.is_none_or(|t| member.tier() == t))
        .filter(|member| query.status.is_none_or(|s| member.status() == s))
        .cloned()
        .collect();
    members.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
    members
}

// ============================================================================
// ヘルパー
// ============================================================================

fn load_book(repo: &Repository, id: BookId) -> Result<Book> {
    repo.book(id)
        .cloned()
        .ok_or_else(|| CatalogError::NotFound(format!("book {id}")))
}

fn load_member(repo: &Repository, id: MemberId) -> Result<Member> {
    repo.member(id)
        .cloned()
        .ok_or_else(|| CatalogError::NotFound(format!("member {id}")))
}

/// ISBNの書式と一意性を確認する（`except`は自分自身の更新時に除外する書籍）
fn check_isbn(
    validator: &dyn FieldValidator,
    repo: &Repository,
    isbn: &str,
    except: Option<BookId>,
) -> Result<()> {
    if !validator.is_valid_isbn(isbn) {
        return Err(CatalogError::Validation(vec![format!("Invalid ISBN: {isbn}")]));
    }
    match repo.find_book_by_isbn(isbn) {
        Some(existing) if Some(existing.id()) != except => {
            Err(CatalogError::DuplicateIsbn(isbn.trim().to_string()))
        }
        _ => Ok(()),
    }
}

fn check_contact(validator: &dyn FieldValidator, contact: &ContactInfo) -> Result<()> {
    let mut errors = Vec::new();
    let email = contact.email.trim();
    if !email.is_empty() && !validator.is_valid_email(email) {
        errors.push(format!("Invalid email: {email}"));
    }
    let phone = contact.phone.trim();
    if !phone.is_empty() && !validator.is_valid_phone(phone) {
        errors.push(format!("Invalid phone: {phone}"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CatalogError::Validation(errors))
    }
}
