//! # roofest_session
//!
//! Conversation session state machine for roof renovation estimates.
//!
//! A user supplies an address, the Estimation Service returns a sequence of
//! questions, and each answer refines a cost estimate until a final estimate
//! is produced. Contact details may then be captured and sent as a lead.
//!
//! # Components
//!
//! - **Message Timeline**: append-only record of the conversation
//! - **Estimation Tracker**: intermediate and final estimates, range checks
//! - **Lead Capture**: contact draft and lead submission state
//! - **Session Controller**: sequences service calls and drives the above
//! - **Scripted Service**: replays canned replies for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use roofest_session::{AnswerStep, ScriptedEstimationService, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ScriptedEstimationService::new();
//!     let controller = SessionController::new(Arc::new(service));
//!
//!     controller.start_session("10 Main St").await?;
//!     if let AnswerStep::Completed(estimate) = controller.submit_answer("tile").await? {
//!         println!("{} - {}", estimate.cost.min, estimate.cost.max);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod error;
pub mod lead;
pub mod mock;
pub mod service;
pub mod timeline;
pub mod tracker;
pub mod types;
pub mod wire;

pub use controller::{AnswerStep, SessionConfig, SessionController, SessionView};
pub use error::{ErrorKind, ServiceError, ServiceResult, SessionError, SessionResult, StateError};
pub use lead::{ContactDraft, ContactInfo, EstimateSnapshot, LeadCapture, LeadRequest, LeadStatus};
pub use mock::{CapturedCall, ScriptedEstimationService};
pub use service::{AnswerOutcome, BeginOutcome, EstimationService, LeadReceipt, RemoteSessionRecord};
pub use timeline::{Author, Draft, Message, MessageTimeline};
pub use tracker::EstimationTracker;
pub use types::{
    format_amount, format_area, AnswerValue, ConversationSummary, EstimateRange, FinalEstimate,
    Question, QuestionKind, QuestionOption, Session, SessionStatus, SummaryValue,
};
