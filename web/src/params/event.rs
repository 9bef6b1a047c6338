use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

pub(crate) const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct IndexParams {
    /// Comma-separated event types; omit for all.
    pub(crate) types: Option<String>,
    /// Maximum number of events to return (capped at 500).
    pub(crate) limit: Option<usize>,
}

/// Body of `POST /events`.
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct CreateParams {
    /// Event type name, e.g. `skill-progress`.
    #[serde(rename = "type")]
    #[schema(example = "skill-progress")]
    pub(crate) event_type: String,
    /// Payload matching the schema of `type`.
    #[schema(value_type = Object)]
    pub(crate) data: Value,
}
