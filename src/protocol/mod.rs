//! # Arm Protocol Module
//!
//! Frame codec for the newline-delimited JSON protocol of the arm controller.
//!
//! This module handles:
//! - Command encoding (one JSON object per line)
//! - Line framing over the raw serial byte stream
//! - Decoding and classification of replies and telemetry
//! - Telemetry frame validation (six joints, known states)

pub mod message;
pub mod encoder;
pub mod decoder;
pub mod lines;
