//! Estimation Service port and its decoded payloads.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;
use crate::lead::LeadRequest;
use crate::types::{AnswerValue, ConversationSummary, EstimateRange, FinalEstimate, Question};

/// Reply to a Begin call.
#[derive(Debug, Clone, PartialEq)]
pub struct BeginOutcome {
    pub session_id: String,
    /// Address as normalised by the service, when echoed back
    pub address: Option<String>,
    pub roof_area_sqm: f64,
    pub question: Question,
    pub progress: u32,
    pub total_questions: u32,
}

/// Reply to an Answer call.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Continuing {
        question: Question,
        progress: u32,
        /// Absent when the service did not restate the total
        total_questions: Option<u32>,
        intermediate: Option<EstimateRange>,
    },
    Completed(FinalEstimate),
}

/// Acknowledgement of a stored lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadReceipt {
    pub id: Option<i64>,
}

/// The service's stored view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteSessionRecord {
    pub id: String,
    pub address: String,
    pub roof_area_sqm: Option<f64>,
    pub current_question_id: Option<String>,
    pub answers: ConversationSummary,
    pub estimated_cost: Option<EstimateRange>,
    pub is_completed: bool,
    pub created_at: Option<NaiveDateTime>,
    pub last_updated: Option<NaiveDateTime>,
}

/// Remote collaborator owning roof area, question generation and pricing.
///
/// Implementations decode their transport payloads into the types above and
/// report contract violations as [`crate::ServiceError::Protocol`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EstimationService: Send + Sync {
    /// Open a session for an address.
    async fn begin(&self, address: &str) -> ServiceResult<BeginOutcome>;

    /// Send the answer to the current question.
    async fn answer(&self, session_id: &str, answer: &AnswerValue) -> ServiceResult<AnswerOutcome>;

    /// Store a lead for human follow-up.
    async fn submit_lead(&self, lead: &LeadRequest) -> ServiceResult<LeadReceipt>;

    /// Read the stored record of a session.
    async fn session_record(&self, session_id: &str) -> ServiceResult<RemoteSessionRecord>;
}
