//! # Command Encoder
//!
//! Turns a [`Command`] into one newline-terminated JSON line.

use serde_json::{Map, Value};

use super::message::{Command, CMD_KEY};

/// Encode a command as a single wire line
///
/// The command name is stored under `"cmd"` next to the parameters and the
/// result ends with exactly one `\n`. Keys are emitted in sorted order, so
/// the same command always produces the same bytes.
///
/// # Examples
///
/// ```
/// use arm_link::protocol::encoder::encode_command;
/// use arm_link::protocol::message::Command;
///
/// assert_eq!(encode_command(&Command::ping()), "{\"cmd\":\"ping\"}\n");
/// ```
pub fn encode_command(command: &Command) -> String {
    let mut object = Map::with_capacity(command.params().len() + 1);
    for (key, value) in command.params() {
        object.insert(key.clone(), value.clone());
    }
    object.insert(CMD_KEY.to_string(), Value::String(command.name().to_string()));

    // serde_json escapes control characters, so the body never holds a raw newline
    let mut line = Value::Object(object).to_string();
    line.push('\n');
    line
}
