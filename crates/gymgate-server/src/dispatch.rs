//! Unlock command dispatch — `GET /unlock`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde::Deserialize;
use tracing::{info, warn};

use crate::server::AppState;
use crate::websocket::connection::SendError;
use crate::websocket::registry::DeviceRegistry;

/// The fixed command frame written to a device. No envelope, no correlation
/// ID, no device response awaited.
pub const UNLOCK_COMMAND: &str = "UNLOCK";

/// Query parameters for `GET /unlock`.
#[derive(Debug, Deserialize)]
pub struct UnlockQuery {
    /// Target gym ID. Defaults to empty so a missing parameter surfaces as
    /// `MissingTarget` rather than a deserialization rejection.
    #[serde(rename = "gymID", default)]
    pub gym_id: String,
}

/// Why an unlock dispatch failed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No `gymID` supplied.
    #[error("missing gymID parameter")]
    MissingTarget,
    /// No device currently registered under the gym ID.
    #[error("no device connected for gym ID {0:?}")]
    TargetNotConnected(String),
    /// The device was registered but the frame could not be handed to its
    /// writer task.
    #[error("failed to send unlock command to gym ID {gym_id:?}: {source}")]
    SendFailed {
        /// The addressed gym ID.
        gym_id: String,
        /// The underlying handle failure.
        #[source]
        source: SendError,
    },
}

impl DispatchError {
    /// HTTP status this failure maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingTarget => StatusCode::BAD_REQUEST,
            Self::TargetNotConnected(_) => StatusCode::NOT_FOUND,
            Self::SendFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label for the failure class.
    fn reason(&self) -> &'static str {
        match self {
            Self::MissingTarget => "missing_target",
            Self::TargetNotConnected(_) => "not_connected",
            Self::SendFailed { .. } => "send_failed",
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Look up `gym_id` and deliver the unlock frame to its connection.
///
/// Pure registry + handle logic; the HTTP layer is [`unlock_handler`]. A send
/// failure does not unregister the device and is not retried; the device's
/// own session observes the dead socket and cleans up independently.
pub async fn dispatch_unlock(
    registry: &DeviceRegistry,
    gym_id: &str,
) -> Result<(), DispatchError> {
    if gym_id.is_empty() {
        return Err(DispatchError::MissingTarget);
    }

    let conn = registry
        .lookup(gym_id)
        .await
        .ok_or_else(|| DispatchError::TargetNotConnected(gym_id.to_owned()))?;

    conn.send_text(UNLOCK_COMMAND)
        .map_err(|source| DispatchError::SendFailed {
            gym_id: gym_id.to_owned(),
            source,
        })
}

/// `GET /unlock?gymID=<id>`
pub async fn unlock_handler(
    State(state): State<AppState>,
    Query(params): Query<UnlockQuery>,
) -> Result<String, DispatchError> {
    counter!(crate::metrics::UNLOCK_DISPATCH_TOTAL).increment(1);

    match dispatch_unlock(&state.registry, &params.gym_id).await {
        Ok(()) => {
            info!(gym_id = params.gym_id, "unlock signal sent");
            Ok("Unlock signal sent\n".to_owned())
        }
        Err(err) => {
            counter!(crate::metrics::UNLOCK_FAILURES_TOTAL, "reason" => err.reason()).increment(1);
            warn!(gym_id = params.gym_id, error = %err, "unlock dispatch failed");
            Err(err)
        }
    }
}
