//! # Wire Message Types
//!
//! Core definitions for the JSON-lines protocol spoken by the arm controller.
//!
//! Every message is a single JSON object on one line. Outgoing commands carry
//! their name under [`CMD_KEY`]; unsolicited status frames carry
//! `"type": "telemetry"`.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::DecodeError;

/// Key holding the command name, in both directions
pub const CMD_KEY: &str = "cmd";

/// Key holding the message type of incoming frames
pub const TYPE_KEY: &str = "type";

/// Value of [`TYPE_KEY`] marking a telemetry frame
pub const TELEMETRY_TYPE: &str = "telemetry";

/// Line terminator on the wire
pub const LINE_TERMINATOR: u8 = b'\n';

/// Number of joints on the arm
pub const JOINT_COUNT: usize = 6;

/// Joint angles in degrees, base first
pub type JointAngles = [f64; JOINT_COUNT];

/// An outbound request to the controller.
///
/// A command is its name plus an open set of named parameters. Commands carry
/// no request ID; the controller's next reply line is taken as the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    params: Map<String, Value>,
}

impl Command {
    /// Create a command with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Add a named parameter
    ///
    /// A parameter named [`CMD_KEY`] is ignored by the encoder; the command
    /// name always wins.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// `{"cmd": "ping"}`
    pub fn ping() -> Self {
        Self::new("ping")
    }

    /// `{"cmd": "get_state"}`
    pub fn get_state() -> Self {
        Self::new("get_state")
    }

    /// `{"cmd": "set_joints", "targets": [..6], "speed": s}`
    pub fn set_joints(targets: &JointAngles, speed: f64) -> Self {
        Self::new("set_joints")
            .with_param("targets", json!(targets))
            .with_param("speed", json!(speed))
    }

    /// `{"cmd": "play_idle", "name": animation}`
    pub fn play_idle(animation: &str) -> Self {
        Self::new("play_idle").with_param("name", json!(animation))
    }

    /// `{"cmd": "estop"}`
    pub fn estop() -> Self {
        Self::new("estop")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Rebuild a command from a decoded object
    ///
    /// Returns `None` when the object has no string [`CMD_KEY`].
    pub fn from_object(mut object: Map<String, Value>) -> Option<Self> {
        let name = match object.remove(CMD_KEY)? {
            Value::String(name) => name,
            _ => return None,
        };
        Some(Self {
            name,
            params: object,
        })
    }
}

/// The controller's answer to a command.
///
/// A reply is either confirmed (a real reply line carrying `cmd`) or an
/// unconfirmed acknowledgement synthesized when the write went out but the
/// line that came back was not a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    payload: Map<String, Value>,
    confirmed: bool,
}

impl Reply {
    /// Wrap a decoded reply object
    pub fn confirmed(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            confirmed: true,
        }
    }

    /// Minimal success reply used when no correlated reply was seen
    pub fn unconfirmed() -> Self {
        let mut payload = Map::new();
        payload.insert("status".to_string(), json!("ok"));
        payload.insert("message".to_string(), json!("command sent"));
        Self {
            payload,
            confirmed: false,
        }
    }

    /// Echoed command name, if the controller sent one
    pub fn cmd(&self) -> Option<&str> {
        self.payload.get(CMD_KEY).and_then(Value::as_str)
    }

    /// `status` field, if present
    pub fn status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}

/// Arm operating state as reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmState {
    Idle,
    Manual,
    Estop,
    /// Any state name outside the known vocabulary
    Other(String),
}

impl ArmState {
    pub fn as_str(&self) -> &str {
        match self {
            ArmState::Idle => "idle",
            ArmState::Manual => "manual",
            ArmState::Estop => "estop",
            ArmState::Other(name) => name,
        }
    }
}

impl From<&str> for ArmState {
    fn from(name: &str) -> Self {
        match name {
            "idle" => ArmState::Idle,
            "manual" => ArmState::Manual,
            "estop" => ArmState::Estop,
            other => ArmState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unsolicited status snapshot pushed by the controller.
///
/// Both fields are optional and tested independently.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    pub joints: Option<JointAngles>,
    pub state: Option<ArmState>,
}

#[derive(Deserialize)]
struct RawTelemetry {
    #[serde(default)]
    joints: Option<Vec<f64>>,
    #[serde(default)]
    state: Option<String>,
}

impl TelemetryFrame {
    /// Validate a telemetry-classified object
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedTelemetry`] if `joints` is not a list of
    /// exactly six numbers or `state` is not a string. A malformed frame is
    /// rejected whole, never partially applied.
    pub fn from_object(object: Map<String, Value>) -> Result<Self, DecodeError> {
        let raw: RawTelemetry = serde_json::from_value(Value::Object(object))
            .map_err(|e| DecodeError::MalformedTelemetry(e.to_string()))?;

        let joints = match raw.joints {
            Some(list) => Some(JointAngles::try_from(list.as_slice()).map_err(|_| {
                DecodeError::MalformedTelemetry(format!(
                    "expected {} joints, got {}",
                    JOINT_COUNT,
                    list.len()
                ))
            })?),
            None => None,
        };

        Ok(Self {
            joints,
            state: raw.state.as_deref().map(ArmState::from),
        })
    }
}
