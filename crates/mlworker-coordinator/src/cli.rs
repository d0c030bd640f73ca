//! CLI argument definitions for the coordinator.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mlworker_config::LogFormat;
use mlworker_dispatch::WorkerId;

use crate::bootstrap::OrthoConfigLoader;

const PROGRAM_NAME: &str = "mlworker-coordinator";

/// Command-line interface for the ML worker coordinator.
#[derive(Parser, Debug)]
#[command(
    name = "mlworker-coordinator",
    version,
    about = "Sends requests to ML workers over the coordinator's dispatcher",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    /// TOML configuration file; `MLWORKER_CONFIG_PATH` is used otherwise.
    #[arg(long, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,
    /// Tracing filter expression, for example `mlworker_dispatch=debug`.
    #[arg(long, value_name = "FILTER")]
    pub(crate) log_filter: Option<String>,
    /// Log output format (`json` or `compact`).
    #[arg(long, value_name = "FORMAT")]
    pub(crate) log_format: Option<LogFormat>,
    /// Deadline for the call in milliseconds; defaults to the configured one.
    #[arg(long, value_name = "MS")]
    pub(crate) timeout_ms: Option<u64>,
    /// Worker that receives the request.
    #[arg(long, value_name = "WORKER", default_value = "INTERNAL")]
    pub(crate) worker: WorkerId,
    /// Request to send.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

impl Cli {
    /// Loader fed with the configuration flags given on this command line.
    pub(crate) fn config_loader(&self) -> OrthoConfigLoader {
        let mut args = vec![OsString::from(PROGRAM_NAME)];
        if let Some(path) = &self.config_path {
            args.push(OsString::from("--config-path"));
            args.push(path.clone().into_os_string());
        }
        if let Some(filter) = &self.log_filter {
            args.push(OsString::from("--log-filter"));
            args.push(OsString::from(filter));
        }
        if let Some(format) = self.log_format {
            args.push(OsString::from("--log-format"));
            args.push(OsString::from(format.to_string()));
        }
        OrthoConfigLoader::new(args)
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Requests the CLI can send.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Sends a message and prints the worker's echo.
    Echo {
        /// Text to round-trip.
        message: String,
    },
    /// Prints the worker's platform description as JSON.
    Info,
}
