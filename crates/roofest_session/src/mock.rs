//! Scripted Estimation Service for testing.
//!
//! Replays queued replies in order and records every call, so flows can be
//! exercised without a running service.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{ServiceError, ServiceResult};
use crate::lead::LeadRequest;
use crate::service::{AnswerOutcome, BeginOutcome, EstimationService, LeadReceipt, RemoteSessionRecord};
use crate::types::AnswerValue;

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: &'static str,
    pub session_id: Option<String>,
    pub address: Option<String>,
    pub answer: Option<AnswerValue>,
    pub lead: Option<LeadRequest>,
    pub at: DateTime<Utc>,
}

impl CapturedCall {
    fn new(method: &'static str) -> Self {
        Self {
            method,
            session_id: None,
            address: None,
            answer: None,
            lead: None,
            at: Utc::now(),
        }
    }
}

/// Estimation Service replaying scripted replies.
///
/// Each method has its own queue. A call against an empty queue fails with
/// a transport error, which is also how an unexpected call shows up in a
/// test.
#[derive(Clone, Default)]
pub struct ScriptedEstimationService {
    begins: Arc<RwLock<VecDeque<ServiceResult<BeginOutcome>>>>,
    answers: Arc<RwLock<VecDeque<ServiceResult<AnswerOutcome>>>>,
    leads: Arc<RwLock<VecDeque<ServiceResult<LeadReceipt>>>>,
    records: Arc<RwLock<VecDeque<ServiceResult<RemoteSessionRecord>>>>,
    /// Simulated latency applied to every call
    delay: Arc<RwLock<Option<Duration>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl ScriptedEstimationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next `begin` call.
    pub fn on_begin(self, reply: ServiceResult<BeginOutcome>) -> Self {
        self.begins.write().push_back(reply);
        self
    }

    /// Queue a reply for the next `answer` call.
    pub fn on_answer(self, reply: ServiceResult<AnswerOutcome>) -> Self {
        self.answers.write().push_back(reply);
        self
    }

    pub fn on_submit_lead(self, reply: ServiceResult<LeadReceipt>) -> Self {
        self.leads.write().push_back(reply);
        self
    }

    pub fn on_session_record(self, reply: ServiceResult<RemoteSessionRecord>) -> Self {
        self.records.write().push_back(reply);
        self
    }

    /// Delay every reply.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = Some(delay);
        self
    }

    /// Get all captured calls.
    pub fn calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    async fn pause(&self) {
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next<T>(queue: &RwLock<VecDeque<ServiceResult<T>>>, method: &str) -> ServiceResult<T> {
        queue
            .write()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::transport(format!("no scripted response for {}", method))))
    }
}

#[async_trait]
impl EstimationService for ScriptedEstimationService {
    async fn begin(&self, address: &str) -> ServiceResult<BeginOutcome> {
        self.record_call(CapturedCall {
            address: Some(address.to_string()),
            ..CapturedCall::new("begin")
        });
        self.pause().await;
        Self::next(&self.begins, "begin")
    }

    async fn answer(&self, session_id: &str, answer: &AnswerValue) -> ServiceResult<AnswerOutcome> {
        self.record_call(CapturedCall {
            session_id: Some(session_id.to_string()),
            answer: Some(answer.clone()),
            ..CapturedCall::new("answer")
        });
        self.pause().await;
        Self::next(&self.answers, "answer")
    }

    async fn submit_lead(&self, lead: &LeadRequest) -> ServiceResult<LeadReceipt> {
        self.record_call(CapturedCall {
            lead: Some(lead.clone()),
            ..CapturedCall::new("submit_lead")
        });
        self.pause().await;
        Self::next(&self.leads, "submit_lead")
    }

    async fn session_record(&self, session_id: &str) -> ServiceResult<RemoteSessionRecord> {
        self.record_call(CapturedCall {
            session_id: Some(session_id.to_string()),
            ..CapturedCall::new("session_record")
        });
        self.pause().await;
        Self::next(&self.records, "session_record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Question;

    fn outcome() -> BeginOutcome {
        BeginOutcome {
            session_id: "s-1".to_string(),
            address: None,
            roof_area_sqm: 90.0,
            question: Question::free_text("Anything else?"),
            progress: 1,
            total_questions: 3,
        }
    }

    #[tokio::test]
    async fn test_replies_in_order() {
        let service = ScriptedEstimationService::new()
            .on_begin(Ok(outcome()))
            .on_begin(Err(ServiceError::transport("down")));

        assert!(service.begin("a").await.is_ok());
        assert_eq!(
            service.begin("b").await.unwrap_err(),
            ServiceError::transport("down")
        );
        assert!(matches!(
            service.begin("c").await,
            Err(ServiceError::Transport(_))
        ));
        assert_eq!(service.get_method_calls("begin").len(), 3);
    }

    #[tokio::test]
    async fn test_captures_arguments() {
        let service = ScriptedEstimationService::new();
        let _ = service.answer("s-1", &AnswerValue::from("tile")).await;

        let calls = service.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].session_id.as_deref(), Some("s-1"));
        assert_eq!(calls[0].answer, Some(AnswerValue::from("tile")));
        assert!(service.was_called("answer"));
        assert!(!service.was_called("begin"));
    }

    #[tokio::test]
    async fn test_clones_share_script() {
        let service = ScriptedEstimationService::new();
        let handle = service.clone().on_begin(Ok(outcome()));

        assert!(service.begin("a").await.is_ok());
        assert_eq!(handle.call_count(), 1);
    }
}
