//! Device session lifecycle — upgrade, registration handshake, liveness loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::DeviceConnection;
use super::register::{self, Registration};
use crate::server::AppState;

/// `GET /ws` — upgrade and hand the socket to the device session.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max = state.config.max_message_size;
    ws.max_message_size(max)
        .on_upgrade(move |socket| run_device_session(socket, state))
}

/// Why a connection never made it into the registry.
#[derive(Debug, thiserror::Error)]
enum RegistrationFailure {
    /// No usable first frame arrived.
    #[error("no registration frame: {0}")]
    ReadFailed(&'static str),
    /// A frame arrived but was not a valid registration.
    #[error("invalid registration: {0}")]
    Invalid(#[from] register::RegistrationError),
}

/// Run one device connection from upgrade through disconnect.
///
/// 1. Reads exactly one registration frame (bounded by
///    `registration_timeout_secs`); on failure the socket is dropped without
///    a response frame and nothing is registered.
/// 2. Registers the gym ID, closing any displaced connection for the same ID.
/// 3. Blocks on the socket until it fails. Frames after registration carry no
///    payload semantics; a successful read is the liveness signal.
/// 4. Unregisters and returns, dropping the socket on every exit path.
pub async fn run_device_session(socket: WebSocket, state: AppState) {
    counter!(crate::metrics::WS_CONNECTIONS_TOTAL).increment(1);

    let (mut ws_tx, mut ws_rx) = socket.split();

    let registration =
        match read_registration(&mut ws_rx, state.config.registration_timeout_secs).await {
            Ok(registration) => registration,
            Err(reason) => {
                counter!(crate::metrics::REGISTRATIONS_REJECTED_TOTAL).increment(1);
                warn!(%reason, "registration failed, dropping connection");
                return;
            }
        };

    let gym_id = registration.gym_id().to_owned();

    // Writer task owns the sink; the registry and dispatch handlers reach the
    // socket only through the bounded channel.
    let (send_tx, mut send_rx) = mpsc::channel::<Message>(state.config.channel_capacity);
    let writer = tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let conn = Arc::new(DeviceConnection::new(gym_id.clone(), send_tx));
    info!(
        gym_id,
        conn_id = %conn.id,
        shape = registration.shape(),
        "device registered"
    );
    counter!(crate::metrics::REGISTRATIONS_TOTAL, "shape" => registration.shape()).increment(1);
    gauge!(crate::metrics::DEVICES_REGISTERED).increment(1.0);

    if let Some(displaced) = state.registry.register(conn.clone()).await {
        // The superseded connection is told to go away rather than left
        // dangling until its own read happens to fail.
        info!(gym_id, old_conn_id = %displaced.id, "closing superseded connection");
        displaced.close();
    }

    liveness_loop(&mut ws_rx, &gym_id, &conn, state.config.idle_timeout_secs).await;

    let removed = state.registry.unregister(&gym_id, &conn).await;
    info!(
        gym_id,
        conn_id = %conn.id,
        removed,
        duration_secs = conn.age().as_secs(),
        "device disconnected"
    );
    counter!(crate::metrics::WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(crate::metrics::DEVICES_REGISTERED).decrement(1.0);
    histogram!(crate::metrics::CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
    writer.abort();
}

/// Perform the single registration read.
async fn read_registration<S>(
    ws_rx: &mut S,
    timeout_secs: u64,
) -> Result<Registration, RegistrationFailure>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let first = if timeout_secs > 0 {
        match tokio::time::timeout(Duration::from_secs(timeout_secs), ws_rx.next()).await {
            Ok(frame) => frame,
            Err(_) => return Err(RegistrationFailure::ReadFailed("timed out")),
        }
    } else {
        ws_rx.next().await
    };

    match first {
        Some(Ok(Message::Text(text))) => Ok(register::parse_registration(text.as_str())?),
        // Firmware generations disagree on the frame opcode; UTF-8 binary
        // payloads are treated as their text content.
        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
            Ok(text) => Ok(register::parse_registration(text)?),
            Err(_) => Err(RegistrationFailure::ReadFailed("non-UTF8 first frame")),
        },
        Some(Ok(Message::Close(_))) => Err(RegistrationFailure::ReadFailed(
            "closed before registering",
        )),
        Some(Ok(_)) => Err(RegistrationFailure::ReadFailed(
            "control frame before registration",
        )),
        Some(Err(_)) => Err(RegistrationFailure::ReadFailed("receive error")),
        None => Err(RegistrationFailure::ReadFailed("connection closed")),
    }
}

/// Block on the socket until it fails or closes.
///
/// This is the disconnect detector: the read staying pending is what "still
/// connected" means, and its failure is the only way a session ends.
async fn liveness_loop<S>(ws_rx: &mut S, gym_id: &str, conn: &DeviceConnection, idle_secs: u64)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = if idle_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(idle_secs), ws_rx.next()).await {
                Ok(frame) => frame,
                Err(_) => {
                    warn!(gym_id, conn_id = %conn.id, "idle timeout, dropping connection");
                    return;
                }
            }
        } else {
            ws_rx.next().await
        };

        match frame {
            Some(Ok(Message::Close(frame))) => {
                debug!(gym_id, conn_id = %conn.id, reason = ?frame, "device sent close frame");
                return;
            }
            // Payload after registration carries no meaning; discard it.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(gym_id, conn_id = %conn.id, error = %e, "receive error");
                return;
            }
            None => {
                debug!(gym_id, conn_id = %conn.id, "stream ended");
                return;
            }
        }
    }
}
