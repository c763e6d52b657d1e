use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Extension, Router};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{error::Error, machine::Machine, websocket};

async fn run(
    machine: Machine,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
) -> Result<(), Error> {
    let app = Router::new()
        .route("/ws", get(websocket::ws_handler))
        .route("/version", get(show_version))
        // Each websocket client talks to the same machine
        .layer(Extension(machine))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| Error::Web(format!("Could not bind to {addr}: {e}")))?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    if let Some(port_reply) = allocated_port {
        if port_reply.send(addr.port()).is_err() {
            warn!("Nobody wanted to know which port was allocated");
        }
    }

    info!("listening on {}", addr);

    server.await.map_err(|e| Error::Web(e.to_string()))
}

/// Serve websocket clients of the machine on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
pub async fn run_any_port(
    machine: Machine,
    allocated_port: oneshot::Sender<u16>,
) -> Result<(), Error> {
    run(machine, None, Some(allocated_port)).await
}

/// Serve websocket clients of the machine on the given port.
///
/// Clients connect to `/ws`, send `{"raw":"<command>"}` objects
/// and receive every message the machine publishes as json.
pub async fn run_on_port(machine: Machine, port: u16) -> Result<(), Error> {
    run(machine, Some(port), None).await
}

async fn show_version() -> impl IntoResponse {
    format!("CNC Keel v{}\n", env!("CARGO_PKG_VERSION"))
}
