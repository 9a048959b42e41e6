//! Registration protocol — parsing the first frame of a device connection.
//!
//! Two wire shapes are accepted, one per firmware generation:
//!
//! - Structured: a JSON record `{"type":"REGISTER","gymID":"gym-42"}`
//! - Legacy: the whole frame is the gym ID, verbatim
//!
//! The structured decode is attempted first. A frame that decodes as the
//! record is validated strictly: a wrong kind or empty `gymID` is rejected,
//! never reinterpreted as a legacy ID. Only frames that are not the record at
//! all fall back to the legacy shape.

use serde::Deserialize;

/// Message kind a structured registration must carry (case-sensitive).
const REGISTER_KIND: &str = "REGISTER";

/// Structured registration record sent by current firmware.
///
/// Fields default to empty when missing so that a well-formed JSON object
/// with the wrong fields is rejected by validation rather than misread as a
/// legacy ID.
#[derive(Debug, Deserialize)]
struct RegisterMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "gymID", default)]
    gym_id: String,
}

/// A validated registration request, in either accepted wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// JSON record from current firmware.
    Structured {
        /// The gym ID to register under.
        gym_id: String,
    },
    /// Pre-JSON firmware: the whole frame is the gym ID.
    Legacy {
        /// The gym ID to register under.
        gym_id: String,
    },
}

impl Registration {
    /// The gym ID carried by either shape.
    pub fn gym_id(&self) -> &str {
        match self {
            Self::Structured { gym_id } | Self::Legacy { gym_id } => gym_id,
        }
    }

    /// Wire shape label for logs and metrics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Structured { .. } => "structured",
            Self::Legacy { .. } => "legacy",
        }
    }
}

/// Why a first frame was rejected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Empty frame.
    #[error("empty registration frame")]
    Empty,
    /// Structured record with a kind other than `REGISTER`.
    #[error("unexpected message kind {0:?}")]
    WrongKind(String),
    /// Structured record with an empty or missing `gymID`.
    #[error("missing gym ID")]
    MissingGymId,
}

/// Parse the first frame of a connection as a registration request.
pub fn parse_registration(frame: &str) -> Result<Registration, RegistrationError> {
    if let Ok(msg) = serde_json::from_str::<RegisterMessage>(frame) {
        if msg.kind != REGISTER_KIND {
            return Err(RegistrationError::WrongKind(msg.kind));
        }
        if msg.gym_id.is_empty() {
            return Err(RegistrationError::MissingGymId);
        }
        return Ok(Registration::Structured { gym_id: msg.gym_id });
    }

    if frame.is_empty() {
        return Err(RegistrationError::Empty);
    }
    Ok(Registration::Legacy {
        gym_id: frame.to_owned(),
    })
}
