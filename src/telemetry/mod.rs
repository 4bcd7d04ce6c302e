//! # Telemetry Module
//!
//! Handles unsolicited status frames pushed by the arm controller.
//!
//! This module handles:
//! - Reading every incoming line on the single reader task
//! - Routing replies to the waiting command, telemetry to subscribers
//! - Publishing frames on a broadcast channel
//! - Keeping a snapshot of the latest joints and arm state

pub mod dispatcher;
pub mod state;

pub use dispatcher::{DispatcherHandle, PendingReply, ReplyOutcome, TelemetryDispatcher};
pub use state::TelemetryState;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::protocol::message::TelemetryFrame;

/// Default broadcast buffer, in frames
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Fan-out point for validated telemetry.
///
/// Outlives individual connections, so subscriptions survive a reconnect.
#[derive(Debug)]
pub struct TelemetryHub {
    frames: broadcast::Sender<TelemetryFrame>,
    snapshot: watch::Sender<TelemetryState>,
}

impl TelemetryHub {
    pub fn new(capacity: usize) -> Self {
        let (frames, _) = broadcast::channel(capacity.max(1));
        let (snapshot, _) = watch::channel(TelemetryState::default());
        Self { frames, snapshot }
    }

    /// Fold a frame into the snapshot and broadcast it
    pub fn publish(&self, frame: TelemetryFrame) {
        self.snapshot.send_modify(|state| state.apply(&frame, Utc::now()));
        // No subscribers is fine; the snapshot still updates
        let _ = self.frames.send(frame);
    }

    /// Receive every frame published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryFrame> {
        self.frames.subscribe()
    }

    /// Watch the snapshot for changes
    pub fn watch(&self) -> watch::Receiver<TelemetryState> {
        self.snapshot.subscribe()
    }

    /// Copy of the latest snapshot
    pub fn snapshot(&self) -> TelemetryState {
        self.snapshot.borrow().clone()
    }

    /// Run `callback` for every frame on a background task
    ///
    /// The task ends when the hub is dropped. Frames missed because the
    /// callback fell behind are skipped with a warning.
    pub fn spawn_callback<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(TelemetryFrame) + Send + 'static,
    {
        let mut frames = self.subscribe();
        tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => callback(frame),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Telemetry subscriber lagged, skipped {} frames", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
