//! # Telemetry Dispatcher
//!
//! The single reader of the serial link.
//!
//! One task owns the read half of the transport and routes every complete
//! line. Telemetry goes to the [`TelemetryHub`]; a command reply completes the
//! [`PendingReply`] slot armed by the command channel. No other code reads
//! from the port, so a reply can never be swallowed by a competing reader.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::TelemetryHub;
use crate::link::traffic::{Direction, TrafficLog};
use crate::protocol::decoder::{classify, decode_line, Inbound};
use crate::protocol::lines::LineBuffer;
use crate::protocol::message::{Reply, TelemetryFrame};

/// Read chunk size
const READ_CHUNK: usize = 256;

/// What the reader saw first after a command was written
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// A real reply line
    Reply(Reply),
    /// A line that was not a reply; the write is assumed to have landed
    Unconfirmed,
    /// A line that could not be decoded
    Malformed,
}

/// One-shot slot for the reply to the command in flight.
///
/// At most one command waits at a time; arming replaces any previous waiter.
#[derive(Debug, Clone, Default)]
pub struct PendingReply {
    slot: Arc<Mutex<Option<oneshot::Sender<ReplyOutcome>>>>,
}

impl PendingReply {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<ReplyOutcome>>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Arm the slot and get the receiving end
    pub fn arm(&self) -> oneshot::Receiver<ReplyOutcome> {
        let (tx, rx) = oneshot::channel();
        *self.lock() = Some(tx);
        rx
    }

    /// Complete the slot; returns `false` if nothing was waiting
    pub fn resolve(&self, outcome: ReplyOutcome) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Drop any waiter without completing it
    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }
}

/// Reader task state
pub struct TelemetryDispatcher<R> {
    reader: R,
    lines: LineBuffer,
    pending: PendingReply,
    hub: Arc<TelemetryHub>,
    traffic: TrafficLog,
    ack_on_telemetry: bool,
}

impl<R> TelemetryDispatcher<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    /// # Arguments
    ///
    /// * `reader` - Read half of the transport
    /// * `pending` - Slot shared with the command channel
    /// * `hub` - Where validated telemetry is published
    /// * `traffic` - Received lines are recorded here
    /// * `max_line_len` - Longest accepted line in bytes
    /// * `ack_on_telemetry` - Whether telemetry arriving while a command waits
    ///   counts as an unconfirmed acknowledgement
    pub fn new(
        reader: R,
        pending: PendingReply,
        hub: Arc<TelemetryHub>,
        traffic: TrafficLog,
        max_line_len: usize,
        ack_on_telemetry: bool,
    ) -> Self {
        Self {
            reader,
            lines: LineBuffer::new(max_line_len),
            pending,
            hub,
            traffic,
            ack_on_telemetry,
        }
    }

    /// Start the reader on its own task
    pub fn spawn(self) -> DispatcherHandle<R> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        DispatcherHandle { stop_tx, task }
    }

    /// Read and route lines until stopped, EOF, or a read error
    ///
    /// Returns the reader so the caller can reassemble or close the port.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> R {
        let mut chunk = [0u8; READ_CHUNK];
        debug!("Telemetry dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = stop.changed() => {
                    debug!("Telemetry dispatcher stopping");
                    break;
                }

                read = self.reader.read(&mut chunk) => match read {
                    Ok(0) => {
                        warn!("Serial link closed by peer");
                        break;
                    }
                    Ok(n) => {
                        self.lines.extend(&chunk[..n]);
                        self.drain_lines();
                    }
                    Err(e) => {
                        error!("Telemetry read error: {}", e);
                        break;
                    }
                },
            }
        }

        // A command still waiting would otherwise sit out its full timeout
        self.pending.clear();
        self.reader
    }

    fn drain_lines(&mut self) {
        while let Some(line) = self.lines.next_line() {
            match line {
                Ok(line) if line.is_empty() => continue,
                Ok(line) => self.route_line(&line),
                Err(e) => {
                    let placeholder = format!("<unreadable: {}>", e);
                    debug!("RX {}", placeholder);
                    self.traffic.record(Direction::Incoming, &placeholder);
                    warn!("Discarding unreadable line: {}", e);
                    self.pending.resolve(ReplyOutcome::Malformed);
                }
            }
        }
    }

    fn route_line(&self, line: &str) {
        debug!("RX {}", line);
        self.traffic.record(Direction::Incoming, line);

        let object = match decode_line(line) {
            Ok(object) => object,
            Err(e) => {
                warn!("Invalid JSON line '{}': {}", line, e);
                self.pending.resolve(ReplyOutcome::Malformed);
                return;
            }
        };

        match classify(object) {
            Inbound::Telemetry(object) => {
                match TelemetryFrame::from_object(object) {
                    Ok(frame) => self.hub.publish(frame),
                    Err(e) => warn!("Discarding telemetry: {}", e),
                }
                if self.ack_on_telemetry && self.pending.resolve(ReplyOutcome::Unconfirmed) {
                    debug!("Telemetry arrived before reply, command treated as sent");
                }
            }
            Inbound::Reply(reply) => {
                if !self.pending.resolve(ReplyOutcome::Reply(reply)) {
                    info!("Unsolicited reply: {}", line);
                }
            }
            Inbound::Other(_) => {
                if !self.pending.resolve(ReplyOutcome::Unconfirmed) {
                    debug!("Ignoring informational line: {}", line);
                }
            }
        }
    }
}

/// Stop signal and join handle for a running dispatcher
#[derive(Debug)]
pub struct DispatcherHandle<R> {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<R>,
}

impl<R> DispatcherHandle<R> {
    /// Whether the reader task is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the reader to stop and wait for it
    ///
    /// Returns the reader if the task exited within `timeout`; otherwise the
    /// task is aborted and `None` is returned.
    pub async fn stop(self, timeout: Duration) -> Option<R> {
        let _ = self.stop_tx.send(true);
        let mut task = self.task;

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(reader)) => Some(reader),
            Ok(Err(e)) => {
                warn!("Telemetry dispatcher task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Telemetry dispatcher did not stop within {:?}, aborting", timeout);
                task.abort();
                None
            }
        }
    }
}
