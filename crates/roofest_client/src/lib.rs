//! # roofest_client
//!
//! HTTP adapter for the roof renovation Estimation Service.
//!
//! Implements [`roofest_session::EstimationService`] on top of `reqwest`
//! and loads the endpoint settings from defaults, a TOML file and the
//! environment.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use roofest_client::{ClientConfig, HttpEstimationService};
//! use roofest_session::SessionController;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::load(None)?;
//!     let service = HttpEstimationService::new(&config)?;
//!     let controller = SessionController::new(Arc::new(service));
//!
//!     controller.start_session("10 Main St").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::{ClientConfig, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS, ENDPOINT_ENV, TIMEOUT_ENV};
pub use error::{ClientError, ClientResult};
pub use http::HttpEstimationService;
