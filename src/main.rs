//! # Arm Link
//!
//! Command line front end for the six-joint desk arm.
//!
//! Each subcommand connects, does its one job and disconnects. A command the
//! controller never answers exits non-zero.
//!
//! # Example Output
//!
//! ```text
//! $ arm-link ping
//! INFO arm_link::link: Connecting to /dev/ttyUSB0...
//! INFO arm_link::link: Connected to /dev/ttyUSB0
//! pong
//! INFO arm_link::link: Disconnected from /dev/ttyUSB0
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use arm_link::arm::{self, IdleAnimation, JOINT_NAMES};
use arm_link::config::{Config, LoggingConfig};
use arm_link::link::ArmLink;
use arm_link::protocol::message::JointAngles;
use arm_link::serial::{SerialBackend, TokioSerialBackend};

/// Log file name prefix inside `logging.log_dir`
const LOG_FILE_PREFIX: &str = "arm-link.log";

#[derive(Parser, Debug)]
#[command(name = "arm-link", version, about = "Serial link to a six-joint desk arm")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, short, value_name = "FILE", env = "ARM_LINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config and auto-detection.
    #[arg(long, short, value_name = "PORT", global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List serial ports and mark likely controllers.
    Ports,
    /// Check that the controller answers.
    Ping,
    /// Print the controller's reported state.
    State,
    /// Move all six joints (degrees, base first).
    #[command(allow_negative_numbers = true)]
    SetJoints {
        #[arg(num_args = 6, value_name = "ANGLE", required = true)]
        angles: Vec<f64>,

        /// Speed scalar in [0, 1].
        #[arg(long, short, default_value_t = arm::DEFAULT_SPEED)]
        speed: f64,
    },
    /// Play an idle animation.
    Idle {
        #[arg(default_value = "breathing")]
        animation: IdleAnimation,
    },
    /// Emergency stop.
    Estop,
    /// Print telemetry until Ctrl+C.
    Monitor {
        /// Stop after this many seconds.
        #[arg(long, value_name = "N")]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }

    let _guard = init_logging(&config.logging)?;
    info!("Arm Link v{} starting...", env!("CARGO_PKG_VERSION"));

    run(cli.command, config).await
}

/// Console logging, plus a daily rolling file when `log_dir` is set
///
/// The returned guard flushes the file writer on drop and must outlive
/// every log call.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log filter")?;

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if logging.log_dir.is_empty() {
        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .init();
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(Some(guard))
}

async fn run(command: Cmd, config: Config) -> Result<()> {
    if let Cmd::Ports = command {
        return list_ports(&TokioSerialBackend, &config.serial.port_keywords);
    }

    let mut link = ArmLink::new(config);
    link.connect().await?;
    let result = run_connected(&link, command).await;
    link.disconnect().await;
    result
}

async fn run_connected(link: &ArmLink, command: Cmd) -> Result<()> {
    match command {
        // Listed without connecting
        Cmd::Ports => {}
        Cmd::Ping => {
            if !link.ping().await {
                bail!("No answer to ping");
            }
            println!("pong");
        }
        Cmd::State => {
            let reply = link.get_state().await.context("No answer to get_state")?;
            println!("{}", serde_json::to_string_pretty(reply.payload())?);
        }
        Cmd::SetJoints { angles, speed } => {
            let targets = to_joint_angles(&angles)?;
            let (targets, clamped) = arm::clamp_to_limits(&targets);
            if clamped {
                warn!("Targets clamped to joint limits: {:?}", targets);
            }
            if !link.set_joints(&targets, speed).await {
                bail!("No answer to set_joints");
            }
            println!("ok");
        }
        Cmd::Idle { animation } => {
            if !link.play_idle(animation.as_str()).await {
                bail!("No answer to play_idle {}", animation);
            }
            println!("ok");
        }
        Cmd::Estop => {
            if !link.emergency_stop().await {
                bail!("No answer to estop");
            }
            println!("estop sent");
        }
        Cmd::Monitor { seconds } => monitor(link, seconds.map(Duration::from_secs)).await,
    }
    Ok(())
}

fn list_ports(backend: &dyn SerialBackend, keywords: &[String]) -> Result<()> {
    let ports = backend.available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        let marker = if port.matches_any(keywords) { "*" } else { " " };
        println!("{} {:<20} {}", marker, port.name, port.description);
    }
    Ok(())
}

/// Print telemetry frames until Ctrl+C, the deadline, or the link dies
async fn monitor(link: &ArmLink, limit: Option<Duration>) {
    let printer = link.on_telemetry(|frame| {
        let state = frame
            .state
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        match frame.joints {
            Some(joints) => println!("{:<8} {}", state, format_joints(&joints)),
            None => println!("{:<8}", state),
        }
    });

    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    let link_lost = async {
        while link.is_link_alive() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };

    info!("Monitoring telemetry, press Ctrl+C to exit");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
        _ = deadline => {}
        _ = link_lost => warn!("Link lost"),
    }
    printer.abort();

    let snapshot = link.telemetry();
    info!("Frames received: {}", snapshot.frames_received);
}

fn to_joint_angles(values: &[f64]) -> Result<JointAngles> {
    JointAngles::try_from(values).map_err(|_| {
        anyhow::anyhow!("Expected {} angles, got {}", JOINT_NAMES.len(), values.len())
    })
}

fn format_joints(joints: &JointAngles) -> String {
    JOINT_NAMES
        .iter()
        .zip(joints)
        .map(|(name, angle)| format!("{}={:.1}", name, angle))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arm_link::serial::PortInfo;

    struct FixedPorts(Vec<PortInfo>);

    impl SerialBackend for FixedPorts {
        fn available_ports(&self) -> arm_link::error::Result<Vec<PortInfo>> {
            Ok(self.0.clone())
        }

        fn open(
            &self,
            path: &str,
            _settings: &arm_link::serial::PortSettings,
        ) -> arm_link::error::Result<arm_link::serial::BoxedTransport> {
            Err(arm_link::error::ArmLinkError::Serial(format!("cannot open {}", path)))
        }
    }

    #[test]
    fn parses_set_joints() {
        let cli = Cli::try_parse_from([
            "arm-link", "set-joints", "90", "45", "120", "90", "-5", "30", "--speed", "0.8",
        ])
        .expect("set-joints args should parse");

        match cli.command {
            Cmd::SetJoints { angles, speed } => {
                assert_eq!(angles, vec![90.0, 45.0, 120.0, 90.0, -5.0, 30.0]);
                assert_eq!(speed, 0.8);
            }
            other => panic!("Expected SetJoints, got: {:?}", other),
        }
    }

    #[test]
    fn rejects_wrong_joint_count() {
        assert!(Cli::try_parse_from(["arm-link", "set-joints", "90", "45"]).is_err());
        assert!(Cli::try_parse_from(["arm-link", "set-joints"]).is_err());
    }

    #[test]
    fn parses_idle_default_and_named() {
        let cli = Cli::try_parse_from(["arm-link", "idle"]).expect("idle should parse");
        assert!(matches!(
            cli.command,
            Cmd::Idle { animation: IdleAnimation::Breathing }
        ));

        let cli = Cli::try_parse_from(["arm-link", "idle", "curious_tilt"])
            .expect("named idle should parse");
        assert!(matches!(
            cli.command,
            Cmd::Idle { animation: IdleAnimation::CuriousTilt }
        ));

        assert!(Cli::try_parse_from(["arm-link", "idle", "dance"]).is_err());
    }

    #[test]
    fn parses_global_options() {
        let cli = Cli::try_parse_from([
            "arm-link", "monitor", "--seconds", "5", "--port", "/dev/ttyUSB1",
        ])
        .expect("monitor args should parse");

        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB1"));
        assert!(matches!(cli.command, Cmd::Monitor { seconds: Some(5) }));
    }

    #[test]
    fn default_speed_is_half() {
        let cli = Cli::try_parse_from(["arm-link", "set-joints", "1", "2", "3", "4", "5", "6"])
            .expect("set-joints args should parse");
        assert!(matches!(cli.command, Cmd::SetJoints { speed, .. } if speed == 0.5));
    }

    #[test]
    fn joint_angles_from_slice() {
        assert_eq!(
            to_joint_angles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
        assert!(to_joint_angles(&[1.0]).is_err());
    }

    #[test]
    fn formats_joints_with_names() {
        let text = format_joints(&arm::NEUTRAL_POSE);
        assert!(text.starts_with("Base=90.0 Shoulder=45.0"));
        assert!(text.ends_with("Gripper=30.0"));
    }

    #[test]
    fn lists_ports_without_error() {
        let backend = FixedPorts(vec![PortInfo {
            name: "/dev/ttyUSB0".to_string(),
            description: "CP2102 USB to UART Bridge".to_string(),
        }]);
        let keywords = vec!["CP210".to_string()];
        assert!(list_ports(&backend, &keywords).is_ok());
        assert!(list_ports(&FixedPorts(Vec::new()), &keywords).is_ok());
    }
}
