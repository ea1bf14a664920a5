//! Lead capture coordinator.
//!
//! Collects contact details once an estimate is final and builds the lead
//! request sent to the Estimation Service. The network call itself is issued
//! by the session controller so it shares the single-flight guard.

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult, StateError};
use crate::timeline::Message;
use crate::types::{ConversationSummary, EstimateRange, FinalEstimate};

/// Validated contact details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Partially filled contact form. `None` fields are left untouched when
/// merged into the coordinator's draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    fn merge(&mut self, update: ContactDraft) {
        if update.name.is_some() {
            self.name = update.name;
        }
        if update.email.is_some() {
            self.email = update.email;
        }
        if update.phone.is_some() {
            self.phone = update.phone;
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

/// Submission state of the session's lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    Draft,
    Submitted,
    /// The last attempt failed; the draft is kept for a manual retry
    Failed,
}

/// The parts of the final estimate attached to a lead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimateSnapshot {
    pub address: String,
    pub roof_area_sqm: f64,
    pub cost: EstimateRange,
}

impl From<&FinalEstimate> for EstimateSnapshot {
    fn from(estimate: &FinalEstimate) -> Self {
        Self {
            address: estimate.address.clone(),
            roof_area_sqm: estimate.roof_area_sqm,
            cost: estimate.cost,
        }
    }
}

/// A lead ready to be sent to the Estimation Service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadRequest {
    pub contact: ContactInfo,
    pub estimate: EstimateSnapshot,
    /// JSON document holding the answers and the full transcript
    pub conversation_history: String,
}

#[derive(Serialize)]
struct ConversationHistory<'a> {
    answers: &'a ConversationSummary,
    transcript: &'a [Message],
}

/// Serialize the conversation attached to a lead.
pub fn conversation_history(
    answers: &ConversationSummary,
    transcript: &[Message],
) -> serde_json::Result<String> {
    serde_json::to_string(&ConversationHistory {
        answers,
        transcript,
    })
}

#[derive(Debug, Clone, Default)]
pub struct LeadCapture {
    draft: ContactDraft,
    status: LeadStatus,
    attempts: u32,
}

impl LeadCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge contact fields into the draft.
    pub fn collect(&mut self, update: ContactDraft) -> SessionResult<()> {
        if self.status == LeadStatus::Submitted {
            return Err(StateError::LeadAlreadySubmitted.into());
        }
        if update.is_empty() {
            return Ok(());
        }
        self.draft.merge(update);
        if self.status == LeadStatus::Failed {
            self.status = LeadStatus::Draft;
        }
        Ok(())
    }

    pub fn draft(&self) -> &ContactDraft {
        &self.draft
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    /// Number of submission attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether name and email are filled in.
    pub fn can_submit(&self) -> bool {
        self.status != LeadStatus::Submitted && self.contact().is_ok()
    }

    /// Validate the draft into contact details.
    pub fn contact(&self) -> SessionResult<ContactInfo> {
        let name = non_blank(self.draft.name.as_deref())
            .ok_or_else(|| SessionError::Validation("contact name is required".to_string()))?;
        let email = non_blank(self.draft.email.as_deref())
            .ok_or_else(|| SessionError::Validation("contact email is required".to_string()))?;
        let phone = non_blank(self.draft.phone.as_deref());

        Ok(ContactInfo { name, email, phone })
    }

    /// Build the request for the given final estimate.
    pub fn prepare(
        &self,
        estimate: &FinalEstimate,
        conversation_history: String,
    ) -> SessionResult<LeadRequest> {
        if self.status == LeadStatus::Submitted {
            return Err(StateError::LeadAlreadySubmitted.into());
        }
        Ok(LeadRequest {
            contact: self.contact()?,
            estimate: EstimateSnapshot::from(estimate),
            conversation_history,
        })
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// The service accepted the lead; the form is cleared.
    pub fn mark_submitted(&mut self) {
        self.status = LeadStatus::Submitted;
        self.draft = ContactDraft::default();
    }

    /// The service call failed; the draft stays for a retry.
    pub fn mark_failed(&mut self) {
        self.status = LeadStatus::Failed;
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
