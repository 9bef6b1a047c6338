use domain::{NewNotification, Severity};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(crate) struct IndexParams {
    pub(crate) limit: Option<usize>,
    #[serde(default)]
    pub(crate) unread_only: bool,
}

/// Body of `PATCH /notifications`: either one notification or all of them.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateParams {
    pub(crate) notification_id: Option<String>,
    #[serde(default)]
    pub(crate) mark_all_read: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct DeleteParams {
    /// Id of the notification to delete.
    pub(crate) id: String,
}

/// Body of `POST /notifications`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateParams {
    pub(crate) title: String,
    pub(crate) message: String,
    /// One of `info`, `success`, `warning`, `error`. Defaults to `info`.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "info")]
    pub(crate) severity: Option<Severity>,
    #[serde(default)]
    pub(crate) action_url: Option<String>,
}

impl From<CreateParams> for NewNotification {
    fn from(params: CreateParams) -> Self {
        let mut notification = NewNotification::new(params.title, params.message)
            .severity(params.severity.unwrap_or_default());
        if let Some(action_url) = params.action_url {
            notification = notification.action_url(action_url);
        }
        notification
    }
}
