use crate::{
    controller::{event_controller, health_check_controller, notification_controller},
    params, sse, AppState,
};
use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Realtime Platform API"
        ),
        paths(
            event_controller::create,
            event_controller::index,
            event_controller::clear,
            health_check_controller::health_check,
            notification_controller::create,
            notification_controller::index,
            notification_controller::update,
            notification_controller::delete,
            sse::handler::sse_handler,
        ),
        components(
            schemas(
                params::event::CreateParams,
                params::notification::CreateParams,
                params::notification::UpdateParams,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "realtime_platform", description = "Real-time event delivery API")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// The caller's identity arrives in a header set by the gateway in front of
// this service.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id_header",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-user-id",
                    "Id of the authenticated user, set by the upstream gateway",
                ))),
            )
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(realtime_routes(app_state.clone()))
        .merge(event_routes(app_state.clone()))
        .merge(notification_routes(app_state))
        .merge(RapiDoc::with_openapi("/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn realtime_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/realtime", get(sse::handler::sse_handler))
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", post(event_controller::create))
        .route("/events", get(event_controller::index))
        .route("/events", delete(event_controller::clear))
        .with_state(app_state)
}

fn notification_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/notifications", post(notification_controller::create))
        .route("/notifications", get(notification_controller::index))
        .route("/notifications", patch(notification_controller::update))
        .route("/notifications", delete(notification_controller::delete))
        .with_state(app_state)
}
