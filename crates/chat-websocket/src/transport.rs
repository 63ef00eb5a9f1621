//! Transport adapter: a full-duplex text stream to the chat gateway.
//!
//! Opening is split from the stream itself so the runtime can be driven by
//! any [`Connector`]; [`WsConnector`] is the `tokio-tungstenite` one.

use async_trait::async_trait;
use chat_core::{CLOSE_ABNORMAL, ChatError, classify_handshake_status};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use url::Url;

/// Query parameter carrying the auth token.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Close frame without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// One inbound signal from an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// A complete text message.
    Text(String),
    /// The stream failed. A close always follows.
    Error(String),
    /// The stream is closed. `code` is 1006 when no close frame arrived.
    Closed { code: u16, reason: String },
}

/// An opened bidirectional text stream.
///
/// `next_frame` is polled inside `tokio::select!` and must be cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send_text(&mut self, text: String) -> Result<(), ChatError>;

    async fn next_frame(&mut self) -> TransportFrame;

    /// Graceful close. Resources are released even if the handshake fails.
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// Opens transports to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Errors with category `Auth` mean the gateway rejected the handshake.
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, ChatError>;
}

/// Append the token as a query parameter, replacing any previous one.
pub fn endpoint_with_token(endpoint: &Url, token: &str) -> Url {
    let mut url = endpoint.clone();
    let retained: Vec<(String, String)> = endpoint
        .query_pairs()
        .filter(|(key, _)| key != TOKEN_QUERY_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(TOKEN_QUERY_PARAM, token);
    }
    url
}

/// URL with the query stripped, safe for logs.
pub fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport over `tokio-tungstenite`.
pub struct WsTransport {
    ws: Ws,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), ChatError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| ChatError::transport("send_failed", err.to_string()))
    }

    async fn next_frame(&mut self) -> TransportFrame {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return TransportFrame::Text(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|frame| (u16::from(frame.code), frame.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    return TransportFrame::Closed { code, reason };
                }
                // Binary payloads are not part of the protocol; control frames
                // are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(err)) => return TransportFrame::Error(err.to_string()),
                None => {
                    return TransportFrame::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection lost".to_owned(),
                    };
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.ws
            .close(None)
            .await
            .map_err(|err| ChatError::transport("close_failed", err.to_string()))
    }
}

/// Opens [`WsTransport`]s with `connect_async`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, ChatError> {
        match connect_async(url.as_str()).await {
            Ok((ws, _response)) => Ok(Box::new(WsTransport { ws })),
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status().as_u16();
                Err(ChatError::new(
                    classify_handshake_status(status),
                    "handshake_rejected",
                    format!("handshake rejected with HTTP {status}"),
                ))
            }
            Err(err) => Err(ChatError::transport("connect_failed", err.to_string())),
        }
    }
}
