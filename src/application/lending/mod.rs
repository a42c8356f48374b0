mod errors;
mod lending_service;

pub use errors::{LendingError, Result};
pub use lending_service::{
    borrow_book, cancel_loan, get_transaction, loan_history, pay_fine, renew_loan, return_book,
};
