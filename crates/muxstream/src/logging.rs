//! Diagnostics on stderr. Stdout carries command output only.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with a full filter, e.g. `muxstream_client=trace`.
pub const LOG_ENV: &str = "MUXSTREAM_LOG";

/// Crates whose events `--log-level` applies to. Everything else stays at warn.
const OWN_TARGETS: [&str; 4] = [
    "muxstream",
    "muxstream_client",
    "muxstream_frame",
    "muxstream_transport",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct LogSettings {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl LogSettings {
    /// Filter directives for `level`, scoped to this workspace's crates.
    fn directives(&self) -> String {
        let level = self.level.directive();
        let floor = match self.level {
            LogLevel::Off | LogLevel::Error => level,
            _ => "warn",
        };
        let mut directives = vec![floor.to_string()];
        directives.extend(OWN_TARGETS.iter().map(|target| format!("{target}={level}")));
        directives.join(",")
    }

    fn filter(&self, env: Option<&str>) -> EnvFilter {
        env.filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| EnvFilter::try_new(raw).ok())
            .unwrap_or_else(|| EnvFilter::new(self.directives()))
    }

    /// Install the global subscriber. A second call is a no-op.
    pub fn install(self) {
        let env = std::env::var(LOG_ENV).ok();
        let builder = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(self.filter(env.as_deref()))
            .with_ansi(false);

        let _ = match self.format {
            LogFormat::Text => builder.compact().with_target(false).try_init(),
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .try_init(),
        };
    }
}
