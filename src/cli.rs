// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `qexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "qexec",
    version,
    about = "Run a command for every queue message and report how it ended.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `QEXEC_CONFIG`, or `qexec.toml` in the current directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `QEXEC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse + validate the config and print the resolved topics.
    Check,

    /// Feed messages read from stdin to a topic's handler.
    Run {
        /// Topic whose command handles the messages.
        #[arg(long, value_name = "NAME")]
        topic: String,

        /// Treat every stdin line as its own message instead of reading
        /// stdin as a single message body.
        #[arg(long)]
        lines: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let args = CliArgs::try_parse_from([
            "qexec",
            "--config",
            "jobs.toml",
            "--log-level",
            "debug",
            "run",
            "--topic",
            "resize",
            "--lines",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("jobs.toml")));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        match args.command {
            Command::Run { topic, lines } => {
                assert_eq!(topic, "resize");
                assert!(lines);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn subcommand_is_required() {
        assert!(CliArgs::try_parse_from(["qexec"]).is_err());
    }
}
