use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::params::event::{CreateParams, IndexParams, DEFAULT_LIMIT};
use crate::params::parse_types;
use crate::{AppState, Error};
use domain::{event as EventApi, EventType};
use log::*;

/// POST broadcast a typed event to the caller's open connections
#[utoipa::path(
    post,
    path = "/events",
    request_body = CreateParams,
    responses(
        (status = 201, description = "Event recorded and delivered to every open connection"),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Unknown type, notification type, or data not matching the type's schema"),
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
    debug!("POST event of type {} for user {user_id}", params.event_type);

    let event_type: EventType = params.event_type.parse()?;
    let event =
        EventApi::publish(&app_state.broadcaster, &user_id, event_type, params.data).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), event)),
    ))
}

/// GET the caller's retained event history, newest first
#[utoipa::path(
    get,
    path = "/events",
    params(IndexParams),
    responses(
        (status = 200, description = "Recent events across the requested types"),
        (status = 400, description = "Unknown event type in `types`"),
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
) -> Result<Response, Error> {
    debug!("GET recent events for user {user_id}: {params:?}");

    let filter = match parse_types(params.types.as_deref()) {
        Ok(filter) => filter,
        Err(e) => return Ok((StatusCode::BAD_REQUEST, e.to_string()).into_response()),
    };

    let events = EventApi::recent(
        &app_state.broadcaster,
        &user_id,
        filter,
        params.limit.unwrap_or(DEFAULT_LIMIT),
    )
    .await;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), events)).into_response())
}

/// DELETE the caller's event history
#[utoipa::path(
    delete,
    path = "/events",
    responses(
        (status = 204, description = "History cleared; open connections are unaffected"),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub async fn clear(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    info!("Clearing event history for user {user_id}");

    EventApi::clear_history(&app_state.broadcaster, &user_id).await;

    Ok(StatusCode::NO_CONTENT)
}
