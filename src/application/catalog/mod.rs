mod catalog_service;
mod errors;

pub use catalog_service::{
    BookQuery, BookUpdate, MemberQuery, MemberUpdate, add_book, add_member,
    expire_lapsed_memberships, get_book, get_member, reactivate_member, remove_book,
    remove_member, renew_membership, search_books, search_members, set_book_status,
    suspend_member, update_book, update_member,
};
pub use errors::{CatalogError, Result};
