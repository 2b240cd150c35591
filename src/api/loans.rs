//! Loan and history endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        ledger::{LoanDetails, LoanEventResponse},
        user::normalize_username,
    },
};

use super::{books::BookActionResponse, AuthenticatedUser};

/// Borrow or return request; `username` defaults to the caller
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoanRequest {
    pub username: Option<String>,
}

/// Selects whose loan to look up; defaults to the caller
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub username: Option<String>,
}

/// Open loans of one user
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserLoansResponse {
    pub username: String,
    pub active_loans: i64,
    pub max_loans: i64,
    pub loans: Vec<LoanDetails>,
}

fn target_user(requested: Option<String>, caller: &str) -> String {
    requested
        .map(|u| normalize_username(&u))
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| normalize_username(caller))
}

/// Borrow one copy of a book
#[utoipa::path(
    post,
    path = "/books/{book_id}/loan",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = String, Path, description = "Book ID")
    ),
    request_body = LoanRequest,
    responses(
        (status = 200, description = "Book borrowed", body = BookActionResponse),
        (status = 400, description = "Unavailable, already borrowed or loan limit reached", body = crate::error::ErrorResponse),
        (status = 403, description = "Account blocked or not allowed"),
        (status = 404, description = "Book or user not found")
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<String>,
    request: Option<Json<LoanRequest>>,
) -> AppResult<Json<BookActionResponse>> {
    let username = target_user(request.and_then(|Json(r)| r.username), &claims.sub);
    claims.require_self_or_admin(&username)?;

    let outcome = state.services.loans.borrow(&username, &book_id).await?;
    Ok(Json(BookActionResponse {
        message: format!("\"{}\" borrowed", outcome.loan.book_title),
        book: outcome.book,
    }))
}

/// The open loan a user holds on a book
#[utoipa::path(
    get,
    path = "/books/{book_id}/loan",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = String, Path, description = "Book ID"),
        LoanQuery
    ),
    responses(
        (status = 200, description = "Open loan with due date", body = LoanDetails),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "No open loan for this book")
    )
)]
pub async fn current_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<String>,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<LoanDetails>> {
    let username = target_user(query.username, &claims.sub);
    claims.require_self_or_admin(&username)?;

    let loan = state.services.loans.open_loan_for(&username, &book_id).await?;
    Ok(Json(loan))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/books/{book_id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = String, Path, description = "Book ID")
    ),
    request_body = LoanRequest,
    responses(
        (status = 200, description = "Book returned", body = BookActionResponse),
        (status = 400, description = "No active loan for this book"),
        (status = 403, description = "Account blocked or not allowed")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<String>,
    request: Option<Json<LoanRequest>>,
) -> AppResult<Json<BookActionResponse>> {
    let username = target_user(request.and_then(|Json(r)| r.username), &claims.sub);
    claims.require_self_or_admin(&username)?;

    let outcome = state.services.loans.return_book(&username, &book_id).await?;
    Ok(Json(BookActionResponse {
        message: format!("\"{}\" returned", outcome.loan.book_title),
        book: outcome.book,
    }))
}

/// Every history entry, newest first
#[utoipa::path(
    get,
    path = "/books/history",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Full history", body = Vec<LoanEventResponse>),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn full_history(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanEventResponse>>> {
    claims.require_admin()?;

    let entries = state.services.loans.full_history().await?;
    Ok(Json(entries.into_iter().map(LoanEventResponse::from).collect()))
}

/// Open loans of a user with due dates
#[utoipa::path(
    get,
    path = "/books/user/{username}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "Open loans", body = UserLoansResponse),
        (status = 403, description = "Not allowed")
    )
)]
pub async fn user_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(username): Path<String>,
) -> AppResult<Json<UserLoansResponse>> {
    claims.require_self_or_admin(&username)?;

    let loans_service = &state.services.loans;
    let loans = loans_service.open_loans(&username).await?;
    let active_loans = loans_service.active_loan_count(&username).await?;

    Ok(Json(UserLoansResponse {
        username: normalize_username(&username),
        active_loans,
        max_loans: loans_service.max_active_loans(),
        loans,
    }))
}

/// History entries of a user, newest first
#[utoipa::path(
    get,
    path = "/books/user/{username}/history",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "User history", body = Vec<LoanEventResponse>),
        (status = 403, description = "Not allowed")
    )
)]
pub async fn user_history(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<LoanEventResponse>>> {
    claims.require_self_or_admin(&username)?;

    let entries = state.services.loans.history_for_user(&username).await?;
    Ok(Json(entries.into_iter().map(LoanEventResponse::from).collect()))
}
