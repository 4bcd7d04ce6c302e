//! # Arm Link Library
//!
//! Talk to a six-joint desk arm over a USB serial link.
//!
//! The controller speaks newline-delimited JSON: commands go out as
//! `{"cmd": ...}` objects, replies echo the command name, and telemetry
//! frames (`{"type": "telemetry", ...}`) arrive unprompted at any time.
//! A single reader task owns the inbound side and routes each line either
//! to the waiting command or to telemetry subscribers.

pub mod arm;
pub mod config;
pub mod error;
pub mod link;
pub mod protocol;
pub mod serial;
pub mod telemetry;
