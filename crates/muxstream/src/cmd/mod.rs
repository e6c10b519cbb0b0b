use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use muxstream_client::{ClientConfig, TransportConfig};

use crate::exit::{config_error, io_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod listen;
pub mod probe;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request and print the response.
    Send(SendArgs),
    /// Connect and print the negotiated handshake.
    Probe(ProbeArgs),
    /// Connect and print server pushes.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format, load_config(config)?),
        Command::Probe(args) => probe::run(args, format, load_config(config)?),
        Command::Listen(args) => listen::run(args, format, load_config(config)?),
        Command::Version(args) => version::run(args),
    }
}

/// Where to connect. Overrides the transport from `--config`.
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Server address: HOST:PORT, or a ws:// / wss:// URL.
    pub addr: Option<String>,
    /// Use the WebSocket transport.
    #[arg(long)]
    pub ws: bool,
}

impl TargetArgs {
    pub fn apply(&self, mut config: ClientConfig) -> CliResult<ClientConfig> {
        match &self.addr {
            Some(addr) if is_ws_url(addr) => {
                config.transport = TransportConfig::WebSocket { url: addr.clone() };
            }
            Some(addr) if self.ws => {
                config.transport = TransportConfig::WebSocket {
                    url: format!("ws://{addr}"),
                };
            }
            Some(addr) => {
                let (host, port) = parse_host_port(addr)?;
                config.transport = TransportConfig::Tcp { host, port };
            }
            None if self.ws => {
                if let TransportConfig::Tcp { host, port } = &config.transport {
                    config.transport = TransportConfig::WebSocket {
                        url: format!("ws://{host}:{port}"),
                    };
                }
            }
            None => {}
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Raw string body.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read the body from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Request header, repeatable.
    #[arg(long = "header", short = 'H', value_name = "KEY=VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
    /// Time to wait for the response (e.g. 5s, 500ms). Defaults to the config value.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Add an X-Req-Id header with a fresh UUID.
    #[arg(long)]
    pub correlation_id: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Exit after receiving N pushes.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Human-readable endpoint for output.
pub fn peer_label(config: &ClientConfig) -> String {
    match &config.transport {
        TransportConfig::Tcp { host, port } => format!("{host}:{port}"),
        TransportConfig::WebSocket { url } => url.clone(),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<ClientConfig> {
    match path {
        Some(path) => ClientConfig::from_file(path).map_err(config_error),
        None => Ok(ClientConfig::default()),
    }
}

/// Run `future` to completion on a fresh multi-threaded runtime.
pub fn block_on<F: Future>(future: F) -> CliResult<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    Ok(runtime.block_on(future))
}

fn is_ws_url(addr: &str) -> bool {
    addr.starts_with("ws://") || addr.starts_with("wss://")
}

pub fn parse_host_port(addr: &str) -> CliResult<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| CliError::usage(format!("address must be HOST:PORT, got {addr}")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(CliError::usage(format!("missing host in {addr}")));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| CliError::usage(format!("invalid port in {addr}")))?;
    Ok((host.to_string(), port))
}

fn parse_header(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {input}"))?;
    if key.is_empty() {
        return Err("header key must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit_ms) = if let Some(num) = input.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = input.strip_suffix('m') {
        (num, 60_000)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, 1_000)
    } else {
        (input, 1_000)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }
    Ok(Duration::from_millis(value.saturating_mul(unit_ms)))
}
