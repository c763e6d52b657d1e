use std::net::SocketAddr;

use futures::{sink::Sink, stream::Stream, SinkExt, StreamExt};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{
    error::Error, machine::Machine, pubsub::Subscription, serial::codecs::json::JsonObjectCodec,
};

/// What a websocket client may ask for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRequest {
    /// A command passed to the machine as is.
    #[serde(default)]
    pub raw: String,
}

impl WebRequest {
    /// A request to send the given command.
    pub fn raw<S: Into<String>>(command: S) -> Self {
        Self {
            raw: command.into(),
        }
    }

    /// Serialize as a json string.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).expect("Should serialize well")
    }
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(machine): Extension<Machine>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    }

    ws.on_upgrade(move |socket| {
        let span = info_span!("Client", %addr);

        handle_websocket(socket, machine).instrument(span)
    })
}

fn parse_request(object: &[u8]) -> Result<WebRequest, Error> {
    serde_json::from_slice(object).map_err(|e| Error::BadJson {
        request: String::from_utf8_lossy(object).into_owned(),
        problem: e.to_string(),
    })
}

/// Pass every complete request in `buffer` on to the machine.
/// What is left of an unfinished request stays buffered for the next message.
async fn forward_requests(
    codec: &mut JsonObjectCodec,
    buffer: &mut BytesMut,
    machine: &Machine,
) -> Result<(), Error> {
    while let Some(object) = codec.decode(buffer)? {
        trace!(object = %String::from_utf8_lossy(&object), "incoming json message");

        let request = parse_request(&object)?;

        if request.raw.is_empty() {
            debug!("Only raw messages are currently supported");
            continue;
        }

        machine.send(request.raw).await?;
    }

    Ok(())
}

/// Requests are json objects framed across the whole connection,
/// so a websocket message may hold several of them, or only part of one.
pub(crate) async fn read<S>(mut receiver: S, machine: Machine)
where
    S: Unpin,
    S: Stream<Item = Result<WsMessage, axum::Error>>,
{
    let mut codec = JsonObjectCodec::new();
    let mut buffer = BytesMut::new();

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Text(text) => buffer.extend_from_slice(text.as_bytes()),
            WsMessage::Binary(bytes) => buffer.extend_from_slice(&bytes),
            WsMessage::Ping(_) => {
                debug!("socket ping");
                continue;
            }
            WsMessage::Pong(_) => {
                debug!("socket pong");
                continue;
            }
            WsMessage::Close(_) => {
                debug!("client disconnected");
                continue;
            }
        }

        if let Err(e) = forward_requests(&mut codec, &mut buffer, &machine).await {
            warn!(%e, "Closing connection");
            return;
        }
    }

    if !buffer.iter().all(u8::is_ascii_whitespace) {
        debug!(left = buffer.len(), "Connection ended inside a request");
    }

    debug!("no more stuff");
}

pub(crate) async fn write(
    mut sender: impl Sink<WsMessage> + Unpin,
    subscription: Subscription,
) {
    let mut messages = subscription.into_stream();

    while let Some(message) = messages.next().await {
        let envelope = message.envelope().serialize();

        if sender.send(WsMessage::Text(envelope)).await.is_err() {
            debug!("client disconnected");
            return;
        }
        trace!("Message flushed");
    }

    debug!("Machine session over");
}

pub(crate) async fn handle_websocket(websocket: WebSocket, machine: Machine) {
    let (stream_sender, stream_receiver) = websocket.split();

    // Subscribe before anything is read, so replies to this client's commands are not missed.
    let subscription = machine.subscribe();

    let write_handle =
        tokio::spawn(write(stream_sender, subscription).instrument(info_span!("Write")));

    read(stream_receiver, machine)
        .instrument(info_span!("Read"))
        .await;

    debug!("Aborting write task");
    // This ensures the underlying TCP connection gets closed,
    // which signals the peer that the session is over.
    write_handle.abort();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn request_shape() {
        assert_eq!(WebRequest::raw("G0X1").serialize(), r#"{"raw":"G0X1"}"#);

        let request: WebRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, WebRequest::default());
    }

    #[test]
    fn bad_request_keeps_the_text() {
        let error = parse_request(br#"{"raw":5}"#).unwrap_err();

        assert!(
            matches!(&error, Error::BadJson { request, .. } if request == r#"{"raw":5}"#),
            "{error:?}"
        );
    }
}
