use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use tungstenite::protocol::Message as WsMessage;

use crate::{
    error::Error,
    message::{Envelope, Message},
    websocket::WebRequest,
};

/// A websocket client of a machine served by [`crate::server`].
pub struct ClientHandle {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ClientHandle {
    /// Connect to the server at the given address and port.
    pub async fn new(address: &str, port: u16) -> Result<Self, Error> {
        Self::connect(&format!("ws://{address}:{port}/ws")).await
    }

    /// Connect to a full websocket url, e.g. `ws://localhost:9000/ws`.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Web(format!("Could not connect to {url}: {e}")))?;
        debug!(status = %response.status(), "Connected to {url}");

        Ok(Self { stream })
    }

    /// Ask for a command to be sent to the machine.
    pub async fn send<S: Into<String>>(&mut self, command: S) -> Result<(), Error> {
        let request = WebRequest::raw(command);

        self.stream
            .send(WsMessage::Text(request.serialize()))
            .await
            .map_err(|e| Error::Web(e.to_string()))
    }

    /// The next message published by the machine.
    ///
    /// `None` when the server closed the connection.
    pub async fn next_message(&mut self) -> Option<Result<Message, Error>> {
        while let Some(frame) = self.stream.next().await {
            let text = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Close(_)) => return None,
                Ok(other) => {
                    trace!(?other, "Skipping non-text frame");
                    continue;
                }
                Err(e) => return Some(Err(Error::Web(e.to_string()))),
            };

            let message = serde_json::from_str::<Envelope>(&text)
                .map_err(|e| Error::BadJson {
                    request: text.clone(),
                    problem: e.to_string(),
                })
                .and_then(|envelope| {
                    Option::<Message>::from(envelope).ok_or_else(|| Error::BadJson {
                        request: text,
                        problem: "Neither `raw` nor `state` present".into(),
                    })
                });

            return Some(message);
        }

        None
    }
}
