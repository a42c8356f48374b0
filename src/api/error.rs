use crate::application::{catalog::CatalogError, lending::LendingError};
use crate::domain::policy::DenialReason;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub enum ApiError {
    Lending(LendingError),
    Catalog(CatalogError),
    /// リクエスト自体が不正（ヘッダーの書式など）
    BadRequest(String),
    /// ハンドラー内部の障害
    Internal(String),
}

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError::Lending(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Lending(err) => match err {
                // 404 Not Found - リクエストされたリソースが存在しない
                LendingError::NotFound(msg) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{msg} not found"))
                }

                // 422 Unprocessable Entity - ビジネスルール違反
                LendingError::PolicyViolation(reason) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    denial_code(&reason),
                    reason.to_string(),
                ),
                LendingError::InvalidState(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE", msg)
                }

                // 500 Internal Server Error - 内部エラーの詳細はログにのみ残す
                LendingError::PersistenceFailure(e) => {
                    tracing::error!("Persistence failure: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PERSISTENCE_FAILURE",
                        "Failed to persist changes".to_string(),
                    )
                }
            },
            ApiError::Catalog(err) => match err {
                CatalogError::NotFound(msg) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{msg} not found"))
                }
                CatalogError::Validation(errors) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "VALIDATION_ERROR",
                    errors.join(", "),
                ),
                CatalogError::InvalidState(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE", msg)
                }

                // 409 Conflict - 既存データとの衝突
                err @ CatalogError::DuplicateIsbn(_) => {
                    (StatusCode::CONFLICT, "DUPLICATE_ISBN", err.to_string())
                }
                CatalogError::InUse(msg) => (StatusCode::CONFLICT, "IN_USE", msg),

                CatalogError::PersistenceFailure(e) => {
                    tracing::error!("Persistence failure: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PERSISTENCE_FAILURE",
                        "Failed to persist changes".to_string(),
                    )
                }
            },
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error in handler: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}

fn denial_code(reason: &DenialReason) -> &'static str {
    match reason {
        DenialReason::BookUnavailable { .. } => "BOOK_NOT_AVAILABLE",
        DenialReason::MemberNotActive { .. } => "MEMBER_NOT_ACTIVE",
        DenialReason::MembershipExpired { .. } => "MEMBERSHIP_EXPIRED",
        DenialReason::BorrowLimitReached { .. } => "BORROW_LIMIT_REACHED",
        DenialReason::UnpaidFines { .. } => "UNPAID_FINES",
        DenialReason::NotABorrow => "NOT_A_BORROW",
        DenialReason::NotRenewable { .. } => "NOT_RENEWABLE",
        DenialReason::RenewalCapReached { .. } => "RENEWAL_LIMIT_REACHED",
        DenialReason::OutstandingFine { .. } => "OUTSTANDING_FINE",
    }
}
