//! WebSocket side of the chat client.
//!
//! [`spawn_runtime`] starts one task that owns the connection state machine,
//! the live transport and the reconnect timer. Front ends talk to it through a
//! [`ChatRuntimeHandle`]: commands go in, [`chat_core::ChatEvent`]s come out.

mod connection;
/// Reconnecting event loop and its handle.
pub mod runtime;
/// Transport traits and the `tokio-tungstenite` adapter.
pub mod transport;

pub use runtime::{
    ChatRuntimeHandle, DEFAULT_ENDPOINT, RuntimeConfig, spawn_runtime, spawn_runtime_with_connector,
};
pub use transport::{
    Connector, TOKEN_QUERY_PARAM, Transport, TransportFrame, WsConnector, WsTransport,
    endpoint_with_token, redacted,
};
