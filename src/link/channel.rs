//! # Command Channel
//!
//! Write one command, then wait a bounded time for the reader task to hand
//! back the line that answered it.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::traffic::{Direction, TrafficLog};
use crate::protocol::encoder::encode_command;
use crate::protocol::message::{Command, Reply};
use crate::telemetry::{PendingReply, ReplyOutcome};

/// Default wait for a reply line
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Write side of the link plus the reply slot it shares with the reader.
///
/// The writer lock is held for the whole exchange, so commands run one at a
/// time; a second caller waits for the first to finish or time out.
pub struct CommandChannel<W> {
    writer: Mutex<W>,
    pending: PendingReply,
    traffic: TrafficLog,
}

impl<W> CommandChannel<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(writer: W, pending: PendingReply, traffic: TrafficLog) -> Self {
        Self {
            writer: Mutex::new(writer),
            pending,
            traffic,
        }
    }

    /// Send a command and wait for its reply
    ///
    /// # Returns
    ///
    /// * `Some(reply)` - a reply line, or an unconfirmed acknowledgement when
    ///   the first line back was not a reply
    /// * `None` - write failed, nothing arrived within `timeout`, the line
    ///   was malformed, or the reader stopped
    pub async fn send(&self, command: &Command, timeout: Duration) -> Option<Reply> {
        let mut writer = self.writer.lock().await;
        let line = encode_command(command);
        let text = line.trim_end();

        // Armed before writing so a fast reply cannot slip past
        let reply_rx = self.pending.arm();

        if let Err(e) = write_line(&mut *writer, &line).await {
            self.pending.clear();
            error!("Communication error sending '{}': {}", command.name(), e);
            return None;
        }
        debug!("TX {}", text);
        self.traffic.record(Direction::Outgoing, text);

        let outcome = tokio::time::timeout(timeout, reply_rx).await;
        self.pending.clear();

        match outcome {
            Ok(Ok(ReplyOutcome::Reply(reply))) => Some(reply),
            Ok(Ok(ReplyOutcome::Unconfirmed)) => {
                debug!("No reply line for '{}', assuming it was received", command.name());
                Some(Reply::unconfirmed())
            }
            Ok(Ok(ReplyOutcome::Malformed)) => {
                warn!("Invalid response to '{}'", command.name());
                None
            }
            Ok(Err(_)) => {
                warn!("Reader stopped while waiting for reply to '{}'", command.name());
                None
            }
            Err(_) => {
                warn!("No response to '{}' within {:?}", command.name(), timeout);
                None
            }
        }
    }

    /// Take the writer back, e.g. to shut the port down
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
