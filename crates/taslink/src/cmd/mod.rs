use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use taslink_channel::{ChannelConfig, DEFAULT_PORT};
use taslink_frame::DEFAULT_MAX_PAYLOAD;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept a peer and echo every frame back to it.
    Echo(EchoArgs),
    /// Dial a listener and send a single frame.
    Send(SendArgs),
    /// Accept a peer and print received frames.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Settings shared by every command that opens a link.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// TCP port to listen on or dial.
    #[arg(long, short = 'p', env = "TASLINK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Socket receive/send/connect timeout (e.g. 5s, 500ms).
    #[arg(long, env = "TASLINK_TIMEOUT", default_value = "5s")]
    pub timeout: String,
    /// Largest accepted frame payload in bytes.
    #[arg(long, env = "TASLINK_MAX_PAYLOAD", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

impl LinkArgs {
    fn apply(&self, config: ChannelConfig) -> CliResult<ChannelConfig> {
        let timeout = parse_duration(&self.timeout)?;
        Ok(config
            .with_receive_timeout(timeout.as_secs(), timeout.subsec_micros())
            .with_send_timeout(timeout)
            .with_connect_timeout(timeout)
            .with_max_payload_size(self.max_payload))
    }

    pub fn listener_config(&self, bind: IpAddr) -> CliResult<ChannelConfig> {
        self.apply(ChannelConfig::listener(self.port).with_bind_address(bind))
    }

    pub fn dialer_config(&self) -> CliResult<ChannelConfig> {
        self.apply(ChannelConfig::dialer(self.port))
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Host to dial: ip, ip:port, [v6]:port or a host name.
    pub host: String,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Frame kind (0-255).
    #[arg(long, short = 'k', default_value_t = 1)]
    pub kind: u8,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn link_args_fill_channel_config() {
        let link = LinkArgs {
            port: 7001,
            timeout: "1500ms".to_string(),
            max_payload: 64,
        };
        let config = link.dialer_config().unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.receive_timeout, Duration::from_millis(1500));
        assert_eq!(config.connect_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_payload_size, 64);
    }
}
