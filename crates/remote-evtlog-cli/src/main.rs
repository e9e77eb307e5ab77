//! remote-evtlog - Read a remote host's event log
//!
//! Records go to stdout, diagnostics to stderr. The exit status is the
//! invocation status code.

use std::io::Write;

use clap::{Args, Parser, Subcommand, ValueEnum};
use remote_evtlog_core::{
    DEFAULT_BATCH_SIZE, DEFAULT_LOG_NAME, DebugLevel, EventLogApi, OutputMode, QueryOptions,
    RemoteTarget,
};
use remote_evtlog_query::{StreamOutcome, fetch_latest_record_id, query, status_of};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

/// Read records from a remote Windows event log
#[derive(Debug, Parser)]
#[command(name = "remote-evtlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every matching record, newest first
    Query {
        #[command(flatten)]
        target: TargetArgs,

        /// XPath filter; LAST_RECORD prints only the newest record id
        #[arg(short, long)]
        query: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Records fetched per round trip
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Print the id of the newest record (0 if the log is empty)
    Latest {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Host to connect to
    #[arg(long, env = "REMOTE_EVTLOG_HOST")]
    host: String,

    /// Authentication domain; empty uses default authentication
    #[arg(long, env = "REMOTE_EVTLOG_DOMAIN", default_value = "")]
    domain: String,

    #[arg(short, long, env = "REMOTE_EVTLOG_USER", default_value = "")]
    user: String,

    #[arg(
        long,
        env = "REMOTE_EVTLOG_PASSWORD",
        default_value = "",
        hide_env_values = true,
        value_parser = parse_secret
    )]
    password: Zeroizing<String>,

    /// Event log channel
    #[arg(short, long, default_value = DEFAULT_LOG_NAME)]
    log: String,

    /// Diagnostic verbosity (0 = errors only, 1 = basic, 2 = trace)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    debug: u8,
}

fn parse_secret(value: &str) -> Result<Zeroizing<String>, std::convert::Infallible> {
    Ok(Zeroizing::new(value.to_owned()))
}

impl TargetArgs {
    fn into_parts(self) -> (RemoteTarget, QueryOptions) {
        let options =
            QueryOptions::for_log(self.log).with_debug(DebugLevel::from_level(self.debug));
        let target = RemoteTarget {
            host: self.host,
            domain: self.domain,
            username: self.user,
            password: self.password,
        };
        (target, options)
    }
}

impl std::fmt::Debug for TargetArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetArgs")
            .field("host", &self.host)
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("log", &self.log)
            .field("debug", &self.debug)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Delimited,
}

impl From<Format> for OutputMode {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => Self::Structured,
            Format::Delimited => Self::Delimited,
        }
    }
}

impl Command {
    const fn debug(&self) -> u8 {
        match self {
            Self::Query { target, .. } | Self::Latest { target } => target.debug,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.command.debug() {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match run(cli.command) {
        Ok(status) => std::process::exit(i32::try_from(status).unwrap_or(i32::MAX)),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
fn run(command: Command) -> anyhow::Result<u32> {
    let stdout = std::io::stdout();
    execute(remote_evtlog_core::backend::WevtApi, command, stdout.lock())
}

#[cfg(not(windows))]
fn run(_command: Command) -> anyhow::Result<u32> {
    anyhow::bail!("the wevtapi backend is only available on Windows")
}

/// Run `command` against `api`, returning the invocation status.
#[cfg_attr(not(windows), allow(dead_code))]
fn execute<A: EventLogApi, W: Write>(api: A, command: Command, mut out: W) -> anyhow::Result<u32> {
    match command {
        Command::Query {
            target,
            query: filter,
            format,
            batch_size,
        } => {
            let (target, mut options) = target.into_parts();
            options = options
                .with_output(format.into())
                .with_batch_size(batch_size);
            if let Some(filter) = filter {
                options = options.with_query(filter);
            }

            let result = query(api, &target, &options, &mut out);
            if let Ok(StreamOutcome::LastRecord(record_id)) = &result {
                writeln!(out, "{}", record_id.unwrap_or(0))?;
            }
            out.flush()?;
            Ok(status_of(&result))
        }
        Command::Latest { target } => {
            let (target, options) = target.into_parts();
            let result = fetch_latest_record_id(api, &target, &options);
            if let Ok(record_id) = &result {
                writeln!(out, "{}", record_id.unwrap_or(0))?;
            }
            out.flush()?;
            Ok(status_of(&result))
        }
    }
}

#[cfg(test)]
mod tests {
    use remote_evtlog_core::backend::{MemoryEvent, MemoryEventLog};

    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    fn memory_log() -> MemoryEventLog {
        let log = MemoryEventLog::new();
        for id in [40, 41] {
            log.push_event("System", MemoryEvent::new(id, 7036, "Service Control Manager"));
        }
        log
    }

    #[test]
    fn test_defaults() {
        let Command::Query {
            target,
            query,
            format,
            batch_size,
        } = parse(&["remote-evtlog", "query", "--host", "fs01"])
        else {
            panic!("expected query");
        };
        assert_eq!(target.log, "Application");
        assert_eq!(target.domain, "");
        assert_eq!(query, None);
        assert_eq!(format, Format::Json);
        assert_eq!(batch_size, 1);
    }

    #[test]
    fn test_password_stays_redacted() {
        let Command::Latest { target } = parse(&[
            "remote-evtlog",
            "latest",
            "--host",
            "fs01",
            "-u",
            "svc-reader",
            "--password",
            "Hunter2!",
        ]) else {
            panic!("expected latest");
        };
        assert!(!format!("{target:?}").contains("Hunter2!"));

        let (target, _) = target.into_parts();
        assert_eq!(target.username, "svc-reader");
        assert_eq!(target.password.as_str(), "Hunter2!");
        assert!(!format!("{target:?}").contains("Hunter2!"));
    }

    #[test]
    fn test_debug_level_is_bounded() {
        assert!(Cli::try_parse_from(["remote-evtlog", "latest", "--host", "h", "-d", "3"]).is_err());
        assert_eq!(
            parse(&["remote-evtlog", "latest", "--host", "h", "-d", "2"]).debug(),
            2
        );
    }

    #[test]
    fn test_delimited_query() {
        let command = parse(&[
            "remote-evtlog",
            "query",
            "--host",
            "fs01",
            "--log",
            "System",
            "--format",
            "delimited",
        ]);
        let mut out = Vec::new();
        let status = execute(&memory_log(), command, &mut out).unwrap();
        assert_eq!(status, 0);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("RecordID||EventID||"));
        assert!(text.contains("41||7036||System||"));
    }

    #[test]
    fn test_latest_prints_id() {
        let command = parse(&["remote-evtlog", "latest", "--host", "fs01", "-l", "System"]);
        let mut out = Vec::new();
        assert_eq!(execute(&memory_log(), command, &mut out).unwrap(), 0);
        assert_eq!(out, b"41\n");
    }

    #[test]
    fn test_sentinel_query_prints_id() {
        let command = parse(&[
            "remote-evtlog",
            "query",
            "--host",
            "fs01",
            "-l",
            "System",
            "-q",
            "LAST_RECORD",
        ]);
        let mut out = Vec::new();
        assert_eq!(execute(&memory_log(), command, &mut out).unwrap(), 0);
        assert_eq!(out, b"41\n");
    }

    #[test]
    fn test_unknown_channel_status() {
        let command = parse(&["remote-evtlog", "query", "--host", "fs01", "-l", "Nope"]);
        let mut out = Vec::new();
        assert_eq!(execute(&memory_log(), command, &mut out).unwrap(), 15007);
        assert!(out.is_empty());
    }
}
