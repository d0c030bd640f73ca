//! Coordinator side of the ML worker protocol.
//!
//! The coordinator bootstraps in a fixed order: load configuration, install
//! structured telemetry, start the in-process `INTERNAL` worker on a loopback
//! bus, build the [`mlworker_dispatch::Dispatcher`], and mark the worker
//! connected so it learns the maximum reply size. Each stage reports through
//! a [`HealthReporter`], so operators see which one failed.
//!
//! [`run`] drives the same sequence from command-line arguments and writes
//! results to the streams it is handed.

mod bootstrap;
mod cli;
mod health;
mod internal_worker;
mod telemetry;

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mlworker_dispatch::DispatchError;
use thiserror::Error;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Coordinator, OrthoConfigLoader, StaticConfigLoader,
    bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use internal_worker::InternalWorker;
pub use telemetry::{TelemetryError, TelemetryHandle};

use cli::{Cli, CliCommand};

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

/// Errors that end a command-line invocation.
#[derive(Debug, Error)]
pub enum AppError {
    /// The arguments did not parse, or help or version output was requested.
    #[error("{0}")]
    Usage(clap::Error),
    /// The coordinator could not start.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The request failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The worker description could not be rendered.
    #[error("failed to encode worker info: {0}")]
    Encode(#[source] serde_json::Error),
    /// Writing the result failed.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl AppError {
    /// Process exit status for this error.
    ///
    /// Request failures use [`DispatchError::exit_status`]. Bootstrap and
    /// encoding faults return 3.
    #[must_use]
    pub fn exit_status(&self) -> u8 {
        match self {
            Self::Usage(error) => u8::try_from(error.exit_code()).unwrap_or(2),
            Self::Dispatch(error) => error.exit_status(),
            Self::Output(_) => 1,
            Self::Bootstrap(_) | Self::Encode(_) => 3,
        }
    }
}

/// Parses `args`, runs the requested command and reports the exit status.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    ExitCode::from(run_with(
        args,
        stdout,
        stderr,
        Arc::new(StructuredHealthReporter::new()),
        None,
    ))
}

/// [`run`] with an injected reporter and, optionally, a fixed configuration
/// source in place of the command-line one.
pub(crate) fn run_with<I, W, E>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    reporter: Arc<dyn HealthReporter>,
    loader: Option<&dyn ConfigLoader>,
) -> u8
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    let outcome = Cli::try_parse_from(args)
        .map_err(AppError::Usage)
        .and_then(|cli| {
            let configured = cli.config_loader();
            execute(&cli, loader.unwrap_or(&configured), reporter, stdout)
        });
    finish(outcome, stdout, stderr)
}

fn execute<W: Write>(
    cli: &Cli,
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    stdout: &mut W,
) -> Result<(), AppError> {
    let mut coordinator = bootstrap_with(loader, reporter)?;
    let outcome = run_command(&coordinator, cli, stdout);
    coordinator.shutdown();
    outcome
}

fn run_command<W: Write>(
    coordinator: &Coordinator,
    cli: &Cli,
    stdout: &mut W,
) -> Result<(), AppError> {
    match &cli.command {
        CliCommand::Echo { message } => {
            let echoed = coordinator.echo(cli.worker, message, cli.timeout())?;
            writeln!(stdout, "{echoed}")?;
        }
        CliCommand::Info => {
            let info = coordinator.info(cli.worker, cli.timeout())?;
            let rendered = serde_json::to_string_pretty(&info).map_err(AppError::Encode)?;
            writeln!(stdout, "{rendered}")?;
        }
    }
    stdout.flush()?;
    Ok(())
}

fn finish<W: Write, E: Write>(
    outcome: Result<(), AppError>,
    stdout: &mut W,
    stderr: &mut E,
) -> u8 {
    let Err(error) = outcome else {
        return 0;
    };
    let status = error.exit_status();
    let written = match &error {
        AppError::Usage(usage) if !usage.use_stderr() => write!(stdout, "{usage}"),
        AppError::Usage(usage) => write!(stderr, "{usage}"),
        other => writeln!(stderr, "mlworker-coordinator: {other}"),
    };
    if let Err(write_error) = written {
        tracing::warn!(
            target: CLI_TARGET,
            error = %write_error,
            status,
            "failed to report command failure"
        );
    }
    status
}

#[cfg(test)]
mod tests;
