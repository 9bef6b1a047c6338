use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use eventsource_client::{self as es, Client};
use events::EventType;
use futures_util::stream::{BoxStream, StreamExt};
use log::*;
use reqwest::Url;

/// Raw `data:` payloads of one stream. An `Err` item or the end of the
/// stream means the connection is gone.
pub type FrameStream = BoxStream<'static, Result<String>>;

pub const USER_ID_HEADER: &str = "x-user-id";

/// What to subscribe to, and where to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub user_id: String,
    /// Empty means every type.
    pub types: Vec<EventType>,
    pub last_event_id: Option<String>,
}

impl SubscribeRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            types: Vec::new(),
            last_event_id: None,
        }
    }

    pub fn types(mut self, types: Vec<EventType>) -> Self {
        self.types = types;
        self
    }

    pub fn last_event_id(mut self, last_event_id: Option<String>) -> Self {
        self.last_event_id = last_event_id;
        self
    }

    /// `{base_url}/realtime` with the `types` and `lastEventId` query
    /// parameters, percent-encoded.
    pub fn url(&self, base_url: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/realtime", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid base URL {base_url}"))?;

        let mut query = Vec::new();
        if !self.types.is_empty() {
            let types: Vec<&str> = self.types.iter().map(EventType::as_str).collect();
            query.push(("types", types.join(",")));
        }
        if let Some(last_event_id) = &self.last_event_id {
            query.push(("lastEventId", last_event_id.clone()));
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }
}

/// Opens one streaming connection. Implementations must not retry on their
/// own; retrying is the reconnector's job.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, request: &SubscribeRequest) -> Result<FrameStream>;
}

/// [`Connector`] over HTTP using `eventsource-client`.
pub struct EventSourceConnector {
    base_url: String,
}

impl EventSourceConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Connector for EventSourceConnector {
    async fn open(&self, request: &SubscribeRequest) -> Result<FrameStream> {
        let url = request.url(&self.base_url)?;
        debug!("Opening {url}");

        let client = es::ClientBuilder::for_url(url.as_str())?
            .header(USER_ID_HEADER, &request.user_id)?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let stream = client
            .stream()
            .filter_map(|item| async move {
                match item {
                    Ok(es::SSE::Event(event)) => Some(Ok(event.data)),
                    // Keep-alive comments
                    Ok(es::SSE::Comment(_)) => None,
                    Err(e) => Some(Err(anyhow!("SSE error: {e:?}"))),
                }
            })
            .boxed();

        Ok(stream)
    }
}
