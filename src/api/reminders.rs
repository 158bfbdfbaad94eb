//! Reminder endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{error::AppResult, models::reminder::Reminder};

use super::{ApiPath, AuthenticatedUser};

/// Send an overdue reminder to the requester of a borrow request
#[utoipa::path(
    post,
    path = "/reminders/send/{id}",
    tag = "reminders",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow request ID")),
    responses(
        (status = 201, description = "Reminder created", body = Reminder),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Borrow request not found")
    )
)]
pub async fn send_reminder(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<(StatusCode, Json<Reminder>)> {
    principal.require_admin()?;
    let reminder = state.services.reminders.notify(id).await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// List the current user's unseen reminders
#[utoipa::path(
    get,
    path = "/reminders/me",
    tag = "reminders",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unseen reminders", body = Vec<Reminder>)
    )
)]
pub async fn my_reminders(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<Reminder>>> {
    let reminders = state.services.reminders.list_unseen_for(principal.id).await?;
    Ok(Json(reminders))
}

/// Mark one of your reminders as seen
#[utoipa::path(
    patch,
    path = "/reminders/{id}/seen",
    tag = "reminders",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reminder ID")),
    responses(
        (status = 200, description = "Reminder marked as seen", body = Reminder),
        (status = 403, description = "Not your reminder"),
        (status = 404, description = "Reminder not found")
    )
)]
pub async fn mark_seen(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<Reminder>> {
    let reminder = state.services.reminders.mark_seen(id, principal).await?;
    Ok(Json(reminder))
}
