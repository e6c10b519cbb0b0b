use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{MessageConnector, MessageSink, MessageSource, WireMessage};

/// Default WebSocket endpoint used when none is configured.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080";

/// Connects to a WebSocket endpoint (`ws://` or `wss://`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> Result<(MessageSink, MessageSource)> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(TransportError::InvalidAddress {
                addr: self.url.clone(),
                reason: "expected a ws:// or wss:// url".to_string(),
            });
        }

        let (socket, response) = connect_async(self.url.as_str()).await?;
        debug!(url = %self.url, status = %response.status(), "websocket connected");

        let (sink, stream) = socket.split();
        let sink = sink.sink_map_err(TransportError::from).with(|payload: Bytes| {
            future::ready(Ok::<_, TransportError>(Message::Binary(payload.to_vec())))
        });
        let source = stream.filter_map(|item| future::ready(inbound(item)));

        Ok((Box::pin(sink), source.boxed()))
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl MessageConnector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'_, Result<(MessageSink, MessageSource)>> {
        Box::pin(self.open())
    }

    fn peer(&self) -> String {
        self.url.clone()
    }
}

fn inbound(
    item: std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<WireMessage>> {
    match item {
        Ok(Message::Binary(data)) => Some(Ok(WireMessage::Binary(Bytes::from(data)))),
        Ok(Message::Text(text)) => Some(Ok(WireMessage::Text(text))),
        Ok(Message::Close(frame)) => Some(Ok(WireMessage::Close(
            frame.map(|frame| frame.reason.into_owned()),
        ))),
        // Keepalives are answered by tungstenite itself.
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Err(err) => Some(Err(err.into())),
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    #[tokio::test]
    async fn binary_messages_flow_both_ways_and_pings_are_hidden() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Ping(vec![1, 2])).await.unwrap();
            ws.send(Message::Binary(vec![9, 8, 7])).await.unwrap();
            ws.send(Message::Text("hello".to_string())).await.unwrap();

            loop {
                match ws.next().await {
                    Some(Ok(Message::Binary(data))) => return data,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected inbound: {other:?}"),
                }
            }
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}"));
        let (mut sink, mut source) = connector.connect().await.unwrap();

        let first = source.next().await.unwrap().unwrap();
        assert_eq!(first, WireMessage::Binary(Bytes::from_static(&[9, 8, 7])));
        let second = source.next().await.unwrap().unwrap();
        assert_eq!(second, WireMessage::Text("hello".to_string()));

        sink.send(Bytes::from_static(b"frame")).await.unwrap();
        assert_eq!(server.await.unwrap(), b"frame".to_vec());
    }

    #[tokio::test]
    async fn rejects_non_websocket_url() {
        let connector = WebSocketConnector::new("http://127.0.0.1:1");
        assert!(matches!(
            connector.connect().await,
            Err(TransportError::InvalidAddress { .. })
        ));
    }
}
