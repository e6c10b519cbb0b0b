use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use muxstream_client::Handshake;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// What a printed body was.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Response,
    Push,
}

#[derive(Serialize)]
struct BodyOutput<'a> {
    kind: BodyKind,
    peer: &'a str,
    size: usize,
    body: String,
    timestamp: String,
}

#[derive(Serialize)]
struct HandshakeOutput<'a> {
    peer: &'a str,
    connect_id: String,
    heartbeat_interval_secs: u64,
    frame_timeout_secs: u64,
    max_concurrent: u8,
    max_bytes: u32,
}

pub fn print_body(kind: BodyKind, body: &[u8], peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = BodyOutput {
                kind,
                peer,
                size: body.len(),
                body: body_preview(body),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            let label = match kind {
                BodyKind::Response => "response",
                BodyKind::Push => "push",
            };
            println!(
                "{label} peer={peer} size={} body={}",
                body.len(),
                body_preview(body)
            );
        }
        OutputFormat::Raw => print_raw(body),
    }
}

pub fn print_handshake(handshake: &Handshake, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = HandshakeOutput {
                peer,
                connect_id: handshake.connect_id.to_string(),
                heartbeat_interval_secs: handshake.heartbeat_interval.as_secs(),
                frame_timeout_secs: handshake.frame_timeout.as_secs(),
                max_concurrent: handshake.max_concurrent,
                max_bytes: handshake.max_bytes,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => println!("{peer} {handshake}"),
        OutputFormat::Raw => print_raw(&handshake.to_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
