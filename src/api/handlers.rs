use crate::application::{
    ServiceDependencies,
    catalog::{self, BookQuery, BookUpdate, MemberQuery, MemberUpdate},
    lending,
    reporting::{self, InventoryStats, MemberActivity, OverdueEntry},
};
use crate::domain::{
    BookId, MemberId, NewBook, NewMember, StaffId, TransactionId,
    commands::{BorrowBook, CancelLoan, PayFine, RenewLoan, ReturnBook},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    types::{
        BookResponse, BorrowRequest, ExpiredMembersResponse, MemberResponse, PayFineRequest,
        RenewMembershipRequest, SetBookStatusRequest, TransactionResponse,
    },
};

/// 操作者（職員ID）を渡すヘッダー
pub const STAFF_ID_HEADER: &str = "x-staff-id";

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

/// サービス関数をブロッキング用スレッドで実行する
///
/// サービスはリポジトリのロックを取り、スナップショットをファイルへ同期書き込みするため、
/// 非同期ランタイムのワーカースレッドでは実行しない。
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ServiceDependencies) -> Result<T, ApiError> + Send + 'static,
{
    let deps = state.service_deps.clone();
    tokio::task::spawn_blocking(move || f(&deps))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

/// `x-staff-id`ヘッダーから操作者を取得する（なければシステム）
fn staff_id(headers: &HeaderMap) -> Result<StaffId, ApiError> {
    match headers.get(STAFF_ID_HEADER) {
        None => Ok(StaffId::system()),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(StaffId::from_uuid)
            .ok_or_else(|| {
                ApiError::BadRequest(format!("{STAFF_ID_HEADER} header must be a UUID"))
            }),
    }
}

// ============================================================================
// Books
// ============================================================================

/// POST /books - 書籍を登録
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewBook>,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    let now = Utc::now();
    let book = run_blocking(&state, move |deps| Ok(catalog::add_book(deps, req, now)?)).await?;

    Ok((StatusCode::CREATED, Json(BookResponse::from(book))))
}

/// GET /books - 書籍を検索（q, category, status, available_only）
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let books = run_blocking(&state, move |deps| Ok(catalog::search_books(deps, &query))).await?;

    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

/// GET /books/:id
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookResponse>, ApiError> {
    let id = BookId::from_uuid(id);
    let book = run_blocking(&state, move |deps| Ok(catalog::get_book(deps, id)?)).await?;

    Ok(Json(BookResponse::from(book)))
}

/// PATCH /books/:id - 書籍情報を部分更新
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<BookUpdate>,
) -> Result<Json<BookResponse>, ApiError> {
    let id = BookId::from_uuid(id);
    let now = Utc::now();
    let book = run_blocking(&state, move |deps| {
        Ok(catalog::update_book(deps, id, update, now)?)
    })
    .await?;

    Ok(Json(BookResponse::from(book)))
}

/// POST /books/:id/status - 取り置き・紛失・復帰
pub async fn set_book_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetBookStatusRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let id = BookId::from_uuid(id);
    let now = Utc::now();
    let book = run_blocking(&state, move |deps| {
        Ok(catalog::set_book_status(deps, id, req.status, now)?)
    })
    .await?;

    Ok(Json(BookResponse::from(book)))
}

/// DELETE /books/:id - 取引から参照されていない書籍を削除
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let id = BookId::from_uuid(id);
    run_blocking(&state, move |deps| Ok(catalog::remove_book(deps, id)?)).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Members
// ============================================================================

/// POST /members - 会員を登録
pub async fn create_member(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewMember>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let now = Utc::now();
    let member =
        run_blocking(&state, move |deps| Ok(catalog::add_member(deps, req, now)?)).await?;

    Ok((StatusCode::CREATED, Json(MemberResponse::from(member))))
}

/// GET /members - 会員を検索（q, tier, status）
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MemberQuery>,
) -> Result<Json<Vec<MemberResponse>>, ApiError> {
    let members =
        run_blocking(&state, move |deps| Ok(catalog::search_members(deps, &query))).await?;

    Ok(Json(members.into_iter().map(MemberResponse::from).collect()))
}

/// GET /members/:id
pub async fn get_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberResponse>, ApiError> {
    let id = MemberId::from_uuid(id);
    let member = run_blocking(&state, move |deps| Ok(catalog::get_member(deps, id)?)).await?;

    Ok(Json(MemberResponse::from(member)))
}

/// PATCH /members/:id - 会員情報を部分更新
pub async fn update_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<MemberUpdate>,
) -> Result<Json<MemberResponse>, ApiError> {
    let id = MemberId::from_uuid(id);
    let now = Utc::now();
    let member = run_blocking(&state, move |deps| {
        Ok(catalog::update_member(deps, id, update, now)?)
    })
    .await?;

    Ok(Json(MemberResponse::from(member)))
}

/// DELETE /members/:id
pub async fn delete_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let id = MemberId::from_uuid(id);
    run_blocking(&state, move |deps| Ok(catalog::remove_member(deps, id)?)).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /members/:id/suspend
pub async fn suspend_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberResponse>, ApiError> {
    let id = MemberId::from_uuid(id);
    let now = Utc::now();
    let member =
        run_blocking(&state, move |deps| Ok(catalog::suspend_member(deps, id, now)?)).await?;

    Ok(Json(MemberResponse::from(member)))
}

/// POST /members/:id/reactivate
pub async fn reactivate_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberResponse>, ApiError> {
    let id = MemberId::from_uuid(id);
    let now = Utc::now();
    let member = run_blocking(&state, move |deps| {
        Ok(catalog::reactivate_member(deps, id, now)?)
    })
    .await?;

    Ok(Json(MemberResponse::from(member)))
}

/// POST /members/:id/renew - 会員資格を延長（既定1年）
pub async fn renew_membership(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<RenewMembershipRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let id = MemberId::from_uuid(id);
    let now = Utc::now();
    let member = run_blocking(&state, move |deps| {
        Ok(catalog::renew_membership(deps, id, req.years, now)?)
    })
    .await?;

    Ok(Json(MemberResponse::from(member)))
}

/// POST /memberships/expire - 期限切れの会員をまとめてEXPIREDにする
pub async fn expire_memberships(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExpiredMembersResponse>, ApiError> {
    let now = Utc::now();
    let expired = run_blocking(&state, move |deps| {
        Ok(catalog::expire_lapsed_memberships(deps, now)?)
    })
    .await?;

    Ok(Json(ExpiredMembersResponse {
        expired: expired.into_iter().map(|id| id.value()).collect(),
    }))
}

// ============================================================================
// Loans
// ============================================================================

/// POST /loans - 書籍を貸し出す
pub async fn create_loan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BorrowRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let cmd = BorrowBook {
        book_id: BookId::from_uuid(req.book_id),
        member_id: MemberId::from_uuid(req.member_id),
        borrowed_at: Utc::now(),
        staff_id: staff_id(&headers)?,
    };
    let now = cmd.borrowed_at;

    let loan = run_blocking(&state, move |deps| Ok(lending::borrow_book(deps, cmd)?)).await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse::new(&loan, now)),
    ))
}

/// GET /loans/:id
pub async fn get_loan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let id = TransactionId::from_uuid(id);
    let transaction =
        run_blocking(&state, move |deps| Ok(lending::get_transaction(deps, id)?)).await?;

    Ok(Json(TransactionResponse::new(&transaction, Utc::now())))
}

/// GET /loans/:id/history - 貸出と後続レコード
pub async fn get_loan_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let id = TransactionId::from_uuid(id);
    let history = run_blocking(&state, move |deps| Ok(lending::loan_history(deps, id)?)).await?;

    let now = Utc::now();
    Ok(Json(
        history
            .iter()
            .map(|t| TransactionResponse::new(t, now))
            .collect(),
    ))
}

/// POST /loans/:id/return - 書籍を返却（延滞料を確定）
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let cmd = ReturnBook {
        transaction_id: TransactionId::from_uuid(id),
        returned_at: Utc::now(),
        staff_id: staff_id(&headers)?,
    };
    let now = cmd.returned_at;

    let loan = run_blocking(&state, move |deps| Ok(lending::return_book(deps, cmd)?)).await?;

    Ok(Json(TransactionResponse::new(&loan, now)))
}

/// POST /loans/:id/renew - 貸出を延長
pub async fn renew_loan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let cmd = RenewLoan {
        transaction_id: TransactionId::from_uuid(id),
        renewed_at: Utc::now(),
        staff_id: staff_id(&headers)?,
    };
    let now = cmd.renewed_at;

    let loan = run_blocking(&state, move |deps| Ok(lending::renew_loan(deps, cmd)?)).await?;

    Ok(Json(TransactionResponse::new(&loan, now)))
}

/// POST /loans/:id/pay-fine - 確定済みの延滞料を全額支払う
pub async fn pay_fine(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<PayFineRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let cmd = PayFine {
        transaction_id: TransactionId::from_uuid(id),
        amount: req.amount,
        paid_at: Utc::now(),
        staff_id: staff_id(&headers)?,
    };
    let now = cmd.paid_at;

    let loan = run_blocking(&state, move |deps| Ok(lending::pay_fine(deps, cmd)?)).await?;

    Ok(Json(TransactionResponse::new(&loan, now)))
}

/// POST /loans/:id/cancel - 貸出を取り消す（管理操作）
pub async fn cancel_loan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let cmd = CancelLoan {
        transaction_id: TransactionId::from_uuid(id),
        cancelled_at: Utc::now(),
        staff_id: staff_id(&headers)?,
    };
    let now = cmd.cancelled_at;

    let loan = run_blocking(&state, move |deps| Ok(lending::cancel_loan(deps, cmd)?)).await?;

    Ok(Json(TransactionResponse::new(&loan, now)))
}

// ============================================================================
// Reports
// ============================================================================

/// GET /reports/overdue
pub async fn overdue_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OverdueEntry>>, ApiError> {
    let now = Utc::now();
    let report = run_blocking(&state, move |deps| Ok(reporting::overdue_report(deps, now))).await?;

    Ok(Json(report))
}

/// GET /reports/inventory
pub async fn inventory_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InventoryStats>, ApiError> {
    let now = Utc::now();
    let stats = run_blocking(&state, move |deps| Ok(reporting::inventory_stats(deps, now))).await?;

    Ok(Json(stats))
}

/// GET /reports/members/:id
pub async fn member_activity_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberActivity>, ApiError> {
    let id = MemberId::from_uuid(id);
    let now = Utc::now();
    let activity = run_blocking(&state, move |deps| {
        Ok(reporting::member_activity(deps, id, now)?)
    })
    .await?;

    Ok(Json(activity))
}
