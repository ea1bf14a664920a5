//! roofest CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid configuration or arguments
//! - 3: Estimation Service unavailable
//! - 4: Estimation Service sent invalid data

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use roofest_client::ClientError;
use roofest_session::{ErrorKind, ServiceError, SessionError};

mod commands;
mod render;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_CONFIG: u8 = 2;
    pub const SERVICE_UNAVAILABLE: u8 = 3;
    pub const PROTOCOL_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "roofest=debug,warn"
    } else if cli.quiet {
        "roofest=warn,warn"
    } else {
        "roofest=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // Logs go to stderr so they never mix with the conversation
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match &cli.command {
        Commands::Estimate(args) => commands::estimate::execute(&cli, args).await,
        Commands::Session(args) => commands::session::execute(&cli, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<ClientError>().is_some() {
        return ExitCodes::INVALID_CONFIG;
    }
    if let Some(err) = e.downcast_ref::<ServiceError>() {
        return match err {
            ServiceError::Protocol(_) => ExitCodes::PROTOCOL_ERROR,
            _ => ExitCodes::SERVICE_UNAVAILABLE,
        };
    }
    match e.downcast_ref::<SessionError>().map(SessionError::kind) {
        Some(ErrorKind::Network) => ExitCodes::SERVICE_UNAVAILABLE,
        Some(ErrorKind::Protocol) => ExitCodes::PROTOCOL_ERROR,
        Some(ErrorKind::Validation) => ExitCodes::INVALID_CONFIG,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
