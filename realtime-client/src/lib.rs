//! Client for the realtime event stream.
//!
//! [`ClientReconnector`] keeps one subscription alive across dropped
//! connections, resuming from the last delivered event. The transport sits
//! behind [`Connector`] so the reconnection logic can be driven without a
//! server.
pub mod api_client;
pub mod connector;
pub mod frame;
pub mod reconnector;

pub use api_client::ApiClient;
pub use connector::{Connector, EventSourceConnector, FrameStream, SubscribeRequest};
pub use frame::ServerFrame;
pub use reconnector::{ClientReconnector, ConnectionState, ReconnectConfig};
