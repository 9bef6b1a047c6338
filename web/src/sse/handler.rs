use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::params::{parse_types, realtime::StreamParams};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use log::*;
use service::AppState;
use ::sse::StreamSession;
use std::convert::Infallible;

/// SSE handler that establishes a long-lived connection for real-time updates.
/// A user may hold several at once; each one replays from its own
/// `lastEventId` and then receives live events matching its `types`.
/// Without the query parameter, the `Last-Event-ID` header an `EventSource`
/// sends on reconnect is used instead.
#[utoipa::path(
    get,
    path = "/realtime",
    params(StreamParams),
    responses(
        (status = 200, description = "`text/event-stream` of `data:` frames, starting with a `connected` frame"),
        (status = 400, description = "Unknown event type in `types`"),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("user_id_header" = [])
    )
)]
pub(crate) async fn sse_handler(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let filter = parse_types(params.types.as_deref())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let last_event_id = params.last_event_id.or_else(|| {
        headers
            .get("last-event-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });

    debug!(
        "Establishing SSE connection for user {user_id} (types={:?}, lastEventId={:?})",
        params.types, last_event_id
    );

    let session = StreamSession::open(&app_state.broadcaster, user_id, filter, last_event_id);

    // Dropping the stream (client disconnect) drops the session, which
    // unregisters the connection.
    let stream = session
        .into_stream()
        .map(|frame| Ok::<_, Infallible>(frame.to_sse_event()));

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(app_state.config.keep_alive_interval())))
}
