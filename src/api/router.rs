use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, cancel_loan, create_book, create_loan, create_member, delete_book, delete_member,
    expire_memberships, get_book, get_loan, get_loan_history, get_member, inventory_report,
    list_books, list_members, member_activity_report, overdue_report, pay_fine,
    reactivate_member, renew_loan, renew_membership, return_book, set_book_status,
    suspend_member, update_book, update_member,
};

/// Creates the API router
///
/// Catalog:
/// - POST /books, GET /books, GET|PATCH|DELETE /books/:id, POST /books/:id/status
/// - POST /members, GET /members, GET|PATCH|DELETE /members/:id
/// - POST /members/:id/suspend|reactivate|renew, POST /memberships/expire
///
/// Lending (acting staff id from the `x-staff-id` header):
/// - POST /loans, GET /loans/:id, GET /loans/:id/history
/// - POST /loans/:id/return|renew|pay-fine|cancel
///
/// Reports:
/// - GET /reports/overdue, GET /reports/inventory, GET /reports/members/:id
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Catalog
        .route("/books", post(create_book).get(list_books))
        .route(
            "/books/:id",
            get(get_book).patch(update_book).delete(delete_book),
        )
        .route("/books/:id/status", post(set_book_status))
        .route("/members", post(create_member).get(list_members))
        .route(
            "/members/:id",
            get(get_member).patch(update_member).delete(delete_member),
        )
        .route("/members/:id/suspend", post(suspend_member))
        .route("/members/:id/reactivate", post(reactivate_member))
        .route("/members/:id/renew", post(renew_membership))
        .route("/memberships/expire", post(expire_memberships))
        // Lending
        .route("/loans", post(create_loan))
        .route("/loans/:id", get(get_loan))
        .route("/loans/:id/history", get(get_loan_history))
        .route("/loans/:id/return", post(return_book))
        .route("/loans/:id/renew", post(renew_loan))
        .route("/loans/:id/pay-fine", post(pay_fine))
        .route("/loans/:id/cancel", post(cancel_loan))
        // Reports
        .route("/reports/overdue", get(overdue_report))
        .route("/reports/inventory", get(inventory_report))
        .route("/reports/members/:id", get(member_activity_report))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
