use crate::domain::{Book, BookId, Member, MemberId, Transaction};

/// 一括で確定する変更の集合
///
/// 同じIDへの複数の変更は、追加順に適用される（削除は追加・更新の後）。
#[derive(Debug, Default)]
#[must_use]
pub struct ChangeSet {
    pub(super) books: Vec<Book>,
    pub(super) members: Vec<Member>,
    pub(super) transactions: Vec<Transaction>,
    pub(super) removed_books: Vec<BookId>,
    pub(super) removed_members: Vec<MemberId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_book(mut self, book: Book) -> Self {
        self.books.push(book);
        self
    }

    pub fn put_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn put_transaction(mut self, transaction: Transaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    pub fn remove_book(mut self, id: BookId) -> Self {
        self.removed_books.push(id);
        self
    }

    pub fn remove_member(mut self, id: MemberId) -> Self {
        self.removed_members.push(id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
            && self.members.is_empty()
            && self.transactions.is_empty()
            && self.removed_books.is_empty()
            && self.removed_members.is_empty()
    }
}
