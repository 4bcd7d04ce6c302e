//! # Arm Link Module
//!
//! Connection lifecycle and command surface for the arm controller.
//!
//! This module handles:
//! - Resolving and opening the serial port (explicit or auto-detected)
//! - Waiting for the controller to boot after the port opens
//! - Starting and stopping the telemetry reader
//! - Named commands: ping, get_state, set_joints, play_idle, estop
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!                                 |
//!                                 +--error--> Failed
//! Connected --disconnect()--> Disconnected
//! ```
//!
//! `Failed` behaves like `Disconnected`: `connect()` may be retried from it.

pub mod channel;
pub mod traffic;

pub use channel::{CommandChannel, DEFAULT_REPLY_TIMEOUT};
pub use traffic::{Direction, TrafficEntry, TrafficLog};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::protocol::message::{Command, JointAngles, Reply, TelemetryFrame};
use crate::serial::{find_controller_port, BoxedTransport, SerialBackend, TokioSerialBackend};
use crate::telemetry::{
    DispatcherHandle, PendingReply, TelemetryDispatcher, TelemetryHub, TelemetryState,
};

/// Connection state, owned by [`ArmLink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything that lives exactly as long as an open port
struct Session {
    port: String,
    channel: CommandChannel<WriteHalf<BoxedTransport>>,
    dispatcher: DispatcherHandle<ReadHalf<BoxedTransport>>,
}

impl Session {
    /// Stop the reader, then close the port
    async fn close(self, stop_timeout: Duration) {
        let reader = self.dispatcher.stop(stop_timeout).await;
        let mut writer = self.channel.into_writer();

        if let Err(e) = writer.shutdown().await {
            debug!("Error shutting down {}: {}", self.port, e);
        }
        // Dropping both halves releases the port
        drop(reader);
        drop(writer);
    }
}

/// Handle to the arm controller.
///
/// Owns the transport for the lifetime of a connection. The reader task
/// and the command channel only ever borrow halves of it, and only
/// [`ArmLink::disconnect`] closes it.
///
/// # Examples
///
/// ```no_run
/// use arm_link::config::Config;
/// use arm_link::link::ArmLink;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut arm = ArmLink::new(Config::default());
///     arm.connect().await?;
///
///     if arm.ping().await {
///         arm.set_joints(&[90.0, 45.0, 120.0, 90.0, 0.0, 30.0], 0.5).await;
///     }
///
///     arm.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct ArmLink {
    config: Config,
    backend: Box<dyn SerialBackend>,
    state: ConnectionState,
    session: Option<Session>,
    hub: Arc<TelemetryHub>,
    traffic: TrafficLog,
}

impl fmt::Debug for ArmLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmLink")
            .field("state", &self.state)
            .field("port", &self.port())
            .finish_non_exhaustive()
    }
}

impl ArmLink {
    /// Create a link that talks to real serial ports
    pub fn new(config: Config) -> Self {
        Self::with_backend(config, Box::new(TokioSerialBackend))
    }

    /// Create a link over a custom serial backend
    pub fn with_backend(config: Config, backend: Box<dyn SerialBackend>) -> Self {
        let hub = Arc::new(TelemetryHub::new(config.telemetry.channel_capacity));
        let traffic = TrafficLog::new(config.logging.traffic_history);
        Self {
            config,
            backend,
            state: ConnectionState::Disconnected,
            session: None,
            hub,
            traffic,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Name of the open port, if connected
    pub fn port(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.port.as_str())
    }

    /// Whether the reader task is still running
    ///
    /// A read error ends the reader without changing [`ConnectionState`];
    /// call [`ArmLink::disconnect`] to release the port.
    pub fn is_link_alive(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.dispatcher.is_running())
            .unwrap_or(false)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the port and start the telemetry reader
    ///
    /// Uses `serial.port` if set, otherwise the first port whose description
    /// matches `serial.port_keywords`. After opening, waits `serial.settle_ms`
    /// for the controller to boot. Calling this while connected does nothing.
    ///
    /// # Errors
    ///
    /// Returns error if no port matches or the port cannot be opened. The
    /// state is then [`ConnectionState::Failed`].
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            debug!("Already connected to {}", self.port().unwrap_or("?"));
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match self.open_session().await {
            Ok(session) => {
                info!("Connected to {}", session.port);
                self.session = Some(session);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect: {}", e);
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    async fn open_session(&self) -> Result<Session> {
        let port = self.resolve_port()?;
        info!("Connecting to {}...", port);
        let transport = self.backend.open(&port, &self.config.port_settings())?;

        let settle = self.config.settle_time();
        if !settle.is_zero() {
            debug!("Waiting {:?} for controller boot", settle);
            tokio::time::sleep(settle).await;
        }

        let (reader, writer) = tokio::io::split(transport);
        let pending = PendingReply::new();
        let dispatcher = TelemetryDispatcher::new(
            reader,
            pending.clone(),
            self.hub.clone(),
            self.traffic.clone(),
            self.config.protocol.max_line_len,
            self.config.protocol.ack_on_telemetry,
        )
        .spawn();

        Ok(Session {
            port,
            channel: CommandChannel::new(writer, pending, self.traffic.clone()),
            dispatcher,
        })
    }

    fn resolve_port(&self) -> Result<String> {
        if !self.config.serial.port.is_empty() {
            return Ok(self.config.serial.port.clone());
        }
        let ports = self.backend.available_ports()?;
        find_controller_port(&ports, &self.config.serial.port_keywords)
    }

    /// Stop the reader and close the port
    ///
    /// Waits up to `protocol.stop_timeout_ms` for the reader to exit before
    /// closing. Safe to call when not connected.
    pub async fn disconnect(&mut self) {
        match self.session.take() {
            Some(session) => {
                let port = session.port.clone();
                session.close(self.config.stop_timeout()).await;
                info!("Disconnected from {}", port);
            }
            None => debug!("Disconnect requested while not connected"),
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Send a command and wait up to `timeout` for the reply
    ///
    /// Returns `None` when not connected, when the reader has stopped, on
    /// timeout, or on a malformed reply.
    pub async fn send(&self, command: &Command, timeout: Duration) -> Option<Reply> {
        match &self.session {
            Some(session) if self.state == ConnectionState::Connected => {
                if !session.dispatcher.is_running() {
                    warn!("Link to {} lost, dropping '{}'", session.port, command.name());
                    return None;
                }
                session.channel.send(command, timeout).await
            }
            _ => {
                warn!("Not connected, dropping '{}'", command.name());
                None
            }
        }
    }

    /// [`ArmLink::send`] with the configured reply timeout
    pub async fn send_command(&self, command: &Command) -> Option<Reply> {
        self.send(command, self.config.reply_timeout()).await
    }

    /// Check that the controller answers
    pub async fn ping(&self) -> bool {
        self.send_command(&Command::ping()).await.is_some()
    }

    /// Ask the controller for its current state
    pub async fn get_state(&self) -> Option<Reply> {
        self.send_command(&Command::get_state()).await
    }

    /// Move all joints to `targets` (degrees) at `speed` in [0, 1]
    ///
    /// Out-of-range speeds are clamped. Targets that are not finite numbers
    /// are refused and nothing is sent.
    pub async fn set_joints(&self, targets: &JointAngles, speed: f64) -> bool {
        if let Some(bad) = targets.iter().position(|angle| !angle.is_finite()) {
            warn!("Joint {} target {} is not a finite angle, not sending", bad, targets[bad]);
            return false;
        }
        let clamped = if speed.is_nan() { 0.0 } else { speed.clamp(0.0, 1.0) };
        if clamped != speed {
            warn!("Speed {} outside [0, 1], using {}", speed, clamped);
        }
        self.send_command(&Command::set_joints(targets, clamped))
            .await
            .is_some()
    }

    /// Start a named idle animation
    pub async fn play_idle(&self, animation: &str) -> bool {
        self.send_command(&Command::play_idle(animation)).await.is_some()
    }

    /// Emergency stop
    pub async fn emergency_stop(&self) -> bool {
        self.send_command(&Command::estop()).await.is_some()
    }

    /// Receive every telemetry frame from now on
    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryFrame> {
        self.hub.subscribe()
    }

    /// Watch the telemetry snapshot
    pub fn watch_telemetry(&self) -> watch::Receiver<TelemetryState> {
        self.hub.watch()
    }

    /// Latest joints and arm state seen in telemetry
    pub fn telemetry(&self) -> TelemetryState {
        self.hub.snapshot()
    }

    /// Call `callback` for each telemetry frame on a background task
    pub fn on_telemetry<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnMut(TelemetryFrame) + Send + 'static,
    {
        self.hub.spawn_callback(callback)
    }

    /// Sent and received lines, oldest first
    pub fn traffic(&self) -> &TrafficLog {
        &self.traffic
    }
}
