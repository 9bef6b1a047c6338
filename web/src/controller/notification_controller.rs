use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::params::notification::{CreateParams, DeleteParams, IndexParams, UpdateParams};
use crate::{AppState, Error};
use domain::error::Error as DomainError;
use domain::{notification as NotificationApi, EventId, ListOptions};
use log::*;

/// POST send a notification to the caller
#[utoipa::path(
    post,
    path = "/notifications",
    request_body = CreateParams,
    responses(
        (status = 201, description = "Notification stored and delivered to every open connection"),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Unprocessable Entity"),
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn create(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Json(params): Json<CreateParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST notification for user {user_id}: {params:?}");

    let notification = NotificationApi::send(
        &app_state.broadcaster,
        &app_state.notifications,
        &user_id,
        params.into(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), notification)),
    ))
}

/// GET the caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/notifications",
    params(IndexParams),
    responses(
        (status = 200, description = "Notifications with `meta.unreadCount`"),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn index(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Query(params): Query<IndexParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET notifications for user {user_id}: {params:?}");

    let defaults = ListOptions::default();
    let notifications = app_state.notifications.list(
        &user_id,
        ListOptions {
            limit: params.limit.unwrap_or(defaults.limit),
            unread_only: params.unread_only,
        },
    );
    let unread_count = app_state.notifications.unread_count(&user_id);

    Ok(Json(
        ApiResponse::new(StatusCode::OK.into(), notifications)
            .with_meta(json!({ "unreadCount": unread_count })),
    ))
}

/// PATCH mark one notification, or all of them, as read
#[utoipa::path(
    patch,
    path = "/notifications",
    request_body = UpdateParams,
    responses(
        (status = 200, description = "The updated notification, or `{updated}` when marking all"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found"),
        (status = 422, description = "Neither `notificationId` nor `markAllRead` given"),
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn update(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Json(params): Json<UpdateParams>,
) -> Result<Response, Error> {
    debug!("PATCH notifications for user {user_id}: {params:?}");

    if params.mark_all_read {
        let updated = app_state.notifications.mark_all_read(&user_id);
        return Ok(Json(ApiResponse::new(
            StatusCode::OK.into(),
            json!({ "updated": updated }),
        ))
        .into_response());
    }

    let Some(id) = params.notification_id else {
        return Err(DomainError::invalid("expected notificationId or markAllRead").into());
    };
    let notification = app_state
        .notifications
        .mark_read(&user_id, parse_id(&id)?)?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), notification)).into_response())
}

/// DELETE one notification
#[utoipa::path(
    delete,
    path = "/notifications",
    params(DeleteParams),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found"),
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn delete(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("DELETE notification {} for user {user_id}", params.id);

    app_state
        .notifications
        .delete(&user_id, parse_id(&params.id)?)?;

    Ok(StatusCode::NO_CONTENT)
}

// An id that cannot exist is reported the same way as one that does not.
fn parse_id(id: &str) -> Result<EventId, Error> {
    id.parse()
        .map_err(|_| Error::from(DomainError::not_found()))
}
