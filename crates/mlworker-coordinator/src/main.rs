//! CLI entrypoint for the ML worker coordinator.
//!
//! The binary delegates to [`mlworker_coordinator::run`], which loads
//! configuration, starts the dispatcher and the in-process worker, sends one
//! request and prints the reply.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: the bus delivery thread logs to stderr while the
    // main thread waits for a reply.
    mlworker_coordinator::run(std::env::args_os(), &mut io::stdout(), &mut io::stderr())
}
