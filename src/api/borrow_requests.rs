//! Borrow request endpoints: filing, listing, decisions and returns

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::{
    error::AppResult,
    models::borrow_request::{
        BorrowRequest, CreateBorrowRequest, Decision, DecisionOutcome, OverdueQuery, StockMovement,
    },
};

use super::{ApiJson, ApiPath, ApiQuery, AuthenticatedUser};

/// File a borrow request for the current user
#[utoipa::path(
    post,
    path = "/borrow-requests",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowRequest,
    responses(
        (status = 201, description = "Request created", body = BorrowRequest),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Equipment not found"),
        (status = 409, description = "Not enough equipment in stock")
    )
)]
pub async fn create_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiJson(data): ApiJson<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRequest>)> {
    let request = state.services.borrow_requests.create(principal, data).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List every borrow request, newest first
#[utoipa::path(
    get,
    path = "/borrow-requests",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All requests", body = Vec<BorrowRequest>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_all(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowRequest>>> {
    principal.require_admin()?;
    let requests = state.services.borrow_requests.list_all().await?;
    Ok(Json(requests))
}

/// List the current user's requests, newest first
#[utoipa::path(
    get,
    path = "/borrow-requests/me",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "My requests", body = Vec<BorrowRequest>)
    )
)]
pub async fn list_mine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowRequest>>> {
    let requests = state.services.borrow_requests.list_mine(principal.id).await?;
    Ok(Json(requests))
}

/// Get a borrow request
#[utoipa::path(
    get,
    path = "/borrow-requests/{id}",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow request ID")),
    responses(
        (status = 200, description = "Borrow request", body = BorrowRequest),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Borrow request not found")
    )
)]
pub async fn get_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<BorrowRequest>> {
    let request = state.services.borrow_requests.get(principal, id).await?;
    Ok(Json(request))
}

/// Approve a pending request and take its units out of stock
#[utoipa::path(
    patch,
    path = "/borrow-requests/{id}/approve",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow request ID")),
    responses(
        (status = 200, description = "Request approved", body = DecisionOutcome),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Request or equipment not found"),
        (status = 409, description = "Request already decided, or not enough stock")
    )
)]
pub async fn approve(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<DecisionOutcome>> {
    let outcome = state
        .services
        .approvals
        .decide(id, Decision::Approve, principal)
        .await?;
    Ok(Json(outcome))
}

/// Reject a pending request
#[utoipa::path(
    patch,
    path = "/borrow-requests/{id}/reject",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow request ID")),
    responses(
        (status = 200, description = "Request rejected", body = DecisionOutcome),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already decided")
    )
)]
pub async fn reject(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<DecisionOutcome>> {
    let outcome = state
        .services
        .approvals
        .decide(id, Decision::Reject, principal)
        .await?;
    Ok(Json(outcome))
}

/// Record the return of an approved request and restock its units
#[utoipa::path(
    post,
    path = "/borrow-requests/{id}/return",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow request ID")),
    responses(
        (status = 200, description = "Equipment returned", body = StockMovement),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Request or equipment not found"),
        (status = 409, description = "Request not approved or already returned")
    )
)]
pub async fn return_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<StockMovement>> {
    let movement = state.services.approvals.return_equipment(id, principal).await?;
    Ok(Json(movement))
}

/// List approved, unreturned requests past their due date
#[utoipa::path(
    get,
    path = "/overdue",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(OverdueQuery),
    responses(
        (status = 200, description = "Overdue requests", body = Vec<BorrowRequest>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiQuery(query): ApiQuery<OverdueQuery>,
) -> AppResult<Json<Vec<BorrowRequest>>> {
    principal.require_admin()?;
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    let requests = state.services.borrow_requests.list_overdue(as_of).await?;
    Ok(Json(requests))
}
