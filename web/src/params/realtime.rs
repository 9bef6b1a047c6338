use serde::Deserialize;
use utoipa::IntoParams;

/// Query string of `GET /realtime`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(crate) struct StreamParams {
    /// Comma-separated event types to receive, e.g. `notification,quiz-completed`.
    /// Omit to receive every type.
    pub(crate) types: Option<String>,
    /// Id of the last event the client processed; newer retained events are
    /// replayed before live delivery starts.
    pub(crate) last_event_id: Option<String>,
}
