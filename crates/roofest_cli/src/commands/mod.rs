//! CLI command definitions.
//!
//! Global options select the Estimation Service; each subcommand is a way
//! of talking to it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use roofest_client::{ClientConfig, HttpEstimationService, ENDPOINT_ENV};
use roofest_session::{SessionConfig, SessionController};

pub mod estimate;
pub mod session;

/// roofest - conversational roof renovation estimates
#[derive(Parser)]
#[command(name = "roofest")]
#[command(version, about = "Conversational roof renovation estimates")]
#[command(long_about = r#"
roofest asks the Estimation Service about a property, walks you through a
few questions about the roof and shows the resulting renovation estimate.
A roofer can then be asked to get in touch.

COMMANDS:
  estimate  → Run an interactive estimate
  session   → Show the stored record of a session

CONFIGURATION (lowest to highest precedence):
  built-in defaults, --config file, ROOFEST_ENDPOINT / ROOFEST_TIMEOUT_SECS,
  command-line flags

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid configuration or arguments
  3 - Estimation Service unavailable
  4 - Estimation Service sent invalid data
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Estimation Service base URL
    #[arg(long, global = true, env = ENDPOINT_ENV)]
    pub endpoint: Option<String>,

    /// TOML file with `endpoint` and `timeout_secs`
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Timeout for each service call, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an interactive estimate
    Estimate(estimate::EstimateArgs),

    /// Show the service's stored record of a session
    Session(session::SessionArgs),
}

impl Cli {
    /// Layered client configuration with the command-line overrides applied.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::load(self.config.as_deref())?;
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn service(&self) -> Result<HttpEstimationService> {
        let config = self.client_config()?;
        let service = HttpEstimationService::new(&config)?;
        tracing::debug!(endpoint = %service.base_url(), "Using Estimation Service");
        Ok(service)
    }

    pub fn controller(&self) -> Result<SessionController> {
        let mut config = SessionConfig::default();
        if let Some(secs) = self.timeout {
            config = config.with_call_timeout(Duration::from_secs(secs));
        }
        Ok(SessionController::with_config(Arc::new(self.service()?), config))
    }
}
