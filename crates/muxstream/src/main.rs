mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{LogFormat, LogLevel, LogSettings};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "muxstream", version, about = "Multiplexed request/response client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). MUXSTREAM_LOG overrides it with a full filter.
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Client settings as JSON. Command-line flags take precedence.
    #[arg(long, value_name = "FILE", env = "MUXSTREAM_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    LogSettings {
        format: cli.log_format,
        level: cli.log_level,
    }
    .install();

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format, cli.config.as_deref());

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "muxstream",
            "send",
            "127.0.0.1:9000",
            "--data",
            "hello",
            "-H",
            "api=/echo",
            "--header",
            "lang=en",
            "--timeout",
            "2s",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.target.addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.headers[0], ("api".to_string(), "/echo".to_string()));
    }

    #[test]
    fn rejects_conflicting_body_args() {
        let err = Cli::try_parse_from([
            "muxstream",
            "send",
            "127.0.0.1:9000",
            "--data",
            "hello",
            "--file",
            "body.bin",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_malformed_header() {
        let err = Cli::try_parse_from(["muxstream", "send", "--header", "novalue"])
            .expect_err("header without = should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_probe_over_websocket() {
        let cli = Cli::try_parse_from([
            "muxstream",
            "probe",
            "ws://127.0.0.1:8080/stream",
            "--timeout",
            "3s",
        ])
        .expect("probe args should parse");
        assert!(matches!(cli.command, Command::Probe(_)));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "muxstream",
            "listen",
            "--ws",
            "--count",
            "3",
            "--format",
            "json",
            "--config",
            "client.json",
        ])
        .expect("listen args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert_eq!(cli.config, Some(PathBuf::from("client.json")));
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert!(args.target.ws);
        assert_eq!(args.count, Some(3));
    }
}
