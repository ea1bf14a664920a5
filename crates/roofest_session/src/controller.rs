//! Session controller.
//!
//! Orchestrates calls to the Estimation Service and drives the message
//! timeline, the estimation tracker and lead capture. One controller owns
//! exactly one session.
//!
//! Every operation that calls the service follows the same shape: validate
//! and mark the controller busy under a short lock, await the service
//! outside the lock, then re-take the lock and commit the whole outcome or
//! nothing. A reset while a call is in flight bumps the generation, and the
//! late response is discarded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, SessionError, SessionResult, ServiceResult, StateError};
use crate::lead::{conversation_history, ContactDraft, LeadCapture, LeadStatus};
use crate::service::{AnswerOutcome, BeginOutcome, EstimationService, LeadReceipt, RemoteSessionRecord};
use crate::timeline::{Draft, Message, MessageTimeline};
use crate::tracker::EstimationTracker;
use crate::types::{
    format_amount, format_area, AnswerValue, EstimateRange, FinalEstimate, Question, Session,
    SessionStatus,
};

const START_SESSION: &str = "start_session";
const SUBMIT_ANSWER: &str = "submit_answer";
const SUBMIT_LEAD: &str = "submit_lead";
const FETCH_RECORD: &str = "fetch_remote_record";

/// Controller settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for a single Estimation Service call
    pub call_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Result of a successful answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerStep {
    /// Another question was asked
    Continuing { progress: u32, total_questions: u32 },
    /// Questioning finished with this estimate
    Completed(FinalEstimate),
}

/// Owned snapshot of everything the rendering layer may show.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub messages: Vec<Message>,
    pub intermediate: Option<EstimateRange>,
    pub final_estimate: Option<FinalEstimate>,
    pub lead_status: LeadStatus,
    #[serde(skip)]
    pub lead_draft: ContactDraft,
    /// A service call is in flight
    pub busy: bool,
    /// Label of the answer being sent, until the service replies
    pub pending_answer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    call_id: Uuid,
    operation: &'static str,
}

#[derive(Debug)]
struct SessionInner {
    generation: u64,
    session: Session,
    timeline: MessageTimeline,
    tracker: EstimationTracker,
    lead: LeadCapture,
    in_flight: Option<Ticket>,
    pending_answer: Option<String>,
}

impl SessionInner {
    fn fresh(generation: u64) -> Self {
        Self {
            generation,
            session: Session::default(),
            timeline: MessageTimeline::new(),
            tracker: EstimationTracker::new(),
            lead: LeadCapture::new(),
            in_flight: None,
            pending_answer: None,
        }
    }
}

/// Busy marker held for the duration of one service call.
///
/// Dropping an unfinished guard (timeout, cancelled future) clears the
/// marker if it still belongs to this call.
struct FlightGuard<'a> {
    inner: &'a Mutex<SessionInner>,
    ticket: Ticket,
    armed: bool,
}

impl<'a> FlightGuard<'a> {
    /// Release the marker and check the call still belongs to the live
    /// session.
    fn finish(mut self, inner: &mut SessionInner) -> SessionResult<()> {
        self.armed = false;
        if inner.in_flight == Some(self.ticket) {
            inner.in_flight = None;
            inner.pending_answer = None;
        }
        if inner.generation != self.ticket.generation {
            warn!(
                call_id = %self.ticket.call_id,
                operation = self.ticket.operation,
                generation = self.ticket.generation,
                "Discarding response received after reset"
            );
            return Err(SessionError::Superseded {
                operation: self.ticket.operation,
            });
        }
        Ok(())
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.in_flight == Some(self.ticket) {
            debug!(operation = self.ticket.operation, "Call abandoned, clearing busy marker");
            inner.in_flight = None;
            inner.pending_answer = None;
        }
    }
}

/// Conversation session state machine.
pub struct SessionController {
    service: Arc<dyn EstimationService>,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
}

impl SessionController {
    /// Create a controller with default settings.
    pub fn new(service: Arc<dyn EstimationService>) -> Self {
        Self::with_config(service, SessionConfig::default())
    }

    pub fn with_config(service: Arc<dyn EstimationService>, config: SessionConfig) -> Self {
        Self {
            service,
            config,
            inner: Mutex::new(SessionInner::fresh(0)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a session for `address` and ask the first question.
    pub async fn start_session(&self, address: &str) -> SessionResult<()> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SessionError::Validation("address must not be empty".to_string()));
        }

        let guard = {
            let mut inner = self.inner.lock();
            self.ensure_idle(&inner, START_SESSION)?;
            self.ensure_status(&inner, START_SESSION, SessionStatus::Uninitialized)?;
            self.begin_flight(&mut inner, START_SESSION)
        };

        debug!(address, "Starting session");
        let result = self.bounded(self.service.begin(address)).await;

        let mut inner = self.inner.lock();
        guard.finish(&mut inner)?;
        let outcome = result?;
        self.apply_begin(&mut inner, address, outcome)
    }

    /// Answer the current question.
    ///
    /// The answer is recorded in the timeline only once the service has
    /// replied; until then its label is exposed as the pending answer.
    pub async fn submit_answer(&self, answer: impl Into<AnswerValue>) -> SessionResult<AnswerStep> {
        let answer = answer.into();
        if answer.is_blank() {
            return Err(SessionError::Validation("answer must not be empty".to_string()));
        }

        let (guard, session_id, label) = {
            let mut inner = self.inner.lock();
            self.ensure_idle(&inner, SUBMIT_ANSWER)?;
            self.ensure_status(&inner, SUBMIT_ANSWER, SessionStatus::Active)?;
            let (session_id, label) = match (&inner.session.id, &inner.session.current_question) {
                (Some(id), Some(question)) => (id.clone(), question.label_for(&answer)),
                _ => return Err(self.reject(StateError::NoPendingQuestion)),
            };
            inner.pending_answer = Some(label.clone());
            (self.begin_flight(&mut inner, SUBMIT_ANSWER), session_id, label)
        };

        debug!(session_id = %session_id, answer = %label, "Sending answer");
        let result = self.bounded(self.service.answer(&session_id, &answer)).await;

        let mut inner = self.inner.lock();
        guard.finish(&mut inner)?;
        if inner.session.id.as_deref() != Some(session_id.as_str()) {
            warn!(session_id = %session_id, "Discarding answer for a replaced session");
            return Err(SessionError::Superseded {
                operation: SUBMIT_ANSWER,
            });
        }

        match result? {
            AnswerOutcome::Continuing {
                question,
                progress,
                total_questions,
                intermediate,
            } => Self::apply_continuing(
                &mut inner,
                label,
                question,
                progress,
                total_questions,
                intermediate,
            ),
            AnswerOutcome::Completed(estimate) => Self::apply_completed(&mut inner, label, estimate),
        }
    }

    /// Discard everything and return to `Uninitialized`.
    ///
    /// Always succeeds. A call still in flight will have its response
    /// discarded.
    pub fn reset_session(&self) {
        let mut inner = self.inner.lock();
        let generation = inner.generation + 1;
        let previous = inner.session.id.take();
        *inner = SessionInner::fresh(generation);
        info!(generation, previous_session = ?previous, "Session reset");
    }

    /// Merge contact fields into the lead draft.
    pub fn collect_contact(&self, draft: ContactDraft) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.in_flight, Some(ticket) if ticket.operation == SUBMIT_LEAD) {
            return Err(self.reject(StateError::Busy {
                operation: "collect_contact",
            }));
        }
        inner.lead.collect(draft).map_err(|e| self.log_state(e))
    }

    /// Submit the lead for the final estimate.
    ///
    /// On failure the draft is kept and the lead is marked failed; calling
    /// again retries.
    pub async fn submit_lead(&self) -> SessionResult<LeadReceipt> {
        let (guard, request) = {
            let mut inner = self.inner.lock();
            self.ensure_idle(&inner, SUBMIT_LEAD)?;
            if inner.lead.status() == LeadStatus::Submitted {
                return Err(self.reject(StateError::LeadAlreadySubmitted));
            }
            let estimate = match inner.tracker.final_estimate() {
                Some(estimate) if inner.session.status == SessionStatus::Completed => estimate,
                _ => return Err(self.reject(StateError::NoFinalEstimate)),
            };
            let history = conversation_history(&estimate.summary, inner.timeline.messages())?;
            let request = inner.lead.prepare(estimate, history)?;
            inner.lead.record_attempt();
            (self.begin_flight(&mut inner, SUBMIT_LEAD), request)
        };

        debug!(address = %request.estimate.address, "Submitting lead");
        let result = self.bounded(self.service.submit_lead(&request)).await;

        let mut inner = self.inner.lock();
        guard.finish(&mut inner)?;
        match result {
            Ok(receipt) => {
                inner.lead.mark_submitted();
                info!(lead_id = ?receipt.id, "Lead submitted");
                Ok(receipt)
            }
            Err(e) => {
                inner.lead.mark_failed();
                warn!(attempts = inner.lead.attempts(), "Lead submission failed: {}", e);
                Err(e)
            }
        }
    }

    /// Read the service's stored record of the current session.
    pub async fn fetch_remote_record(&self) -> SessionResult<RemoteSessionRecord> {
        let (guard, session_id) = {
            let mut inner = self.inner.lock();
            self.ensure_idle(&inner, FETCH_RECORD)?;
            let session_id = match &inner.session.id {
                Some(id) => id.clone(),
                None => return Err(self.reject(StateError::NoSession)),
            };
            (self.begin_flight(&mut inner, FETCH_RECORD), session_id)
        };

        let result = self.bounded(self.service.session_record(&session_id)).await;

        let mut inner = self.inner.lock();
        guard.finish(&mut inner)?;
        result
    }

    /// Copy of the current state for display.
    pub fn snapshot(&self) -> SessionView {
        let inner = self.inner.lock();
        SessionView {
            session: inner.session.clone(),
            messages: inner.timeline.messages().to_vec(),
            intermediate: inner.tracker.intermediate().copied(),
            final_estimate: inner.tracker.final_estimate().cloned(),
            lead_status: inner.lead.status(),
            lead_draft: inner.lead.draft().clone(),
            busy: inner.in_flight.is_some(),
            pending_answer: inner.pending_answer.clone(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().session.status
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    async fn bounded<T>(&self, call: impl Future<Output = ServiceResult<T>>) -> SessionResult<T> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => {
                warn!(timeout = ?self.config.call_timeout, "Estimation Service call timed out");
                Err(SessionError::Timeout(self.config.call_timeout))
            }
        }
    }

    fn begin_flight(&self, inner: &mut SessionInner, operation: &'static str) -> FlightGuard<'_> {
        let ticket = Ticket {
            generation: inner.generation,
            call_id: Uuid::new_v4(),
            operation,
        };
        debug!(call_id = %ticket.call_id, operation, "Calling Estimation Service");
        inner.in_flight = Some(ticket);
        FlightGuard {
            inner: &self.inner,
            ticket,
            armed: true,
        }
    }

    fn ensure_idle(&self, inner: &SessionInner, operation: &'static str) -> SessionResult<()> {
        if inner.in_flight.is_some() {
            return Err(self.reject(StateError::Busy { operation }));
        }
        Ok(())
    }

    fn ensure_status(
        &self,
        inner: &SessionInner,
        operation: &'static str,
        expected: SessionStatus,
    ) -> SessionResult<()> {
        if inner.session.status != expected {
            return Err(self.reject(StateError::WrongStatus {
                operation,
                current: inner.session.status,
                expected,
            }));
        }
        Ok(())
    }

    fn reject(&self, err: StateError) -> SessionError {
        warn!("{}", err);
        err.into()
    }

    fn log_state(&self, err: SessionError) -> SessionError {
        if let SessionError::State(state) = &err {
            warn!("{}", state);
        }
        err
    }

    fn apply_begin(
        &self,
        inner: &mut SessionInner,
        address: &str,
        outcome: BeginOutcome,
    ) -> SessionResult<()> {
        if outcome.progress > outcome.total_questions {
            return Err(protocol(format!(
                "progress {} exceeds total {}",
                outcome.progress, outcome.total_questions
            )));
        }
        if !outcome.roof_area_sqm.is_finite() || outcome.roof_area_sqm < 0.0 {
            return Err(protocol(format!("invalid roof area {}", outcome.roof_area_sqm)));
        }

        let address = outcome.address.unwrap_or_else(|| address.to_string());
        inner.timeline.extend([
            Draft::system(format!(
                "Great! I found your property at {}. Estimated roof area: {} m².",
                address,
                format_area(outcome.roof_area_sqm)
            )),
            Draft::system("I'm going to ask you a few questions to refine your renovation estimate."),
            Draft::question(outcome.question.prompt.clone()),
        ]);

        inner.session = Session {
            id: Some(outcome.session_id),
            status: SessionStatus::Active,
            address: Some(address),
            roof_area_sqm: Some(outcome.roof_area_sqm),
            current_question: Some(outcome.question),
            progress: outcome.progress,
            total_questions: outcome.total_questions,
        };
        info!(
            session_id = ?inner.session.id,
            total_questions = inner.session.total_questions,
            "Session started"
        );
        Ok(())
    }

    fn apply_continuing(
        inner: &mut SessionInner,
        label: String,
        question: Question,
        progress: u32,
        total_questions: Option<u32>,
        intermediate: Option<EstimateRange>,
    ) -> SessionResult<AnswerStep> {
        let total = total_questions.unwrap_or(inner.session.total_questions);
        if progress < inner.session.progress {
            return Err(protocol(format!(
                "progress went backwards from {} to {}",
                inner.session.progress, progress
            )));
        }
        if progress > total {
            return Err(protocol(format!("progress {} exceeds total {}", progress, total)));
        }
        if let Some(range) = intermediate {
            inner.tracker.set_intermediate(range)?;
        }

        inner.timeline.append(Draft::user(label));
        if let Some(range) = intermediate {
            inner.timeline.append(Draft::system(format!(
                "Updated estimate: {} € - {} €",
                format_amount(range.min),
                format_amount(range.max)
            )));
        }
        inner.timeline.append(Draft::question(question.prompt.clone()));

        inner.session.current_question = Some(question);
        inner.session.progress = progress;
        inner.session.total_questions = total;
        info!(progress, total, "Question answered");

        Ok(AnswerStep::Continuing {
            progress,
            total_questions: total,
        })
    }

    fn apply_completed(
        inner: &mut SessionInner,
        label: String,
        estimate: FinalEstimate,
    ) -> SessionResult<AnswerStep> {
        inner.tracker.set_final(estimate.clone())?;

        inner.timeline.append(Draft::user(label));
        inner
            .timeline
            .append(Draft::system("Thank you for your answers! Here is your personalized estimate:"));

        let session = &mut inner.session;
        session.status = SessionStatus::Completed;
        session.current_question = None;
        session.progress = session.total_questions.max(session.progress);
        info!(
            session_id = ?session.id,
            min = estimate.cost.min,
            max = estimate.cost.max,
            "Session completed"
        );

        Ok(AnswerStep::Completed(estimate))
    }
}

fn protocol(message: String) -> SessionError {
    warn!("Rejected service reply: {}", message);
    SessionError::Service(ServiceError::Protocol(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockEstimationService;
    use crate::types::{ConversationSummary, QuestionOption};

    fn material() -> Question {
        Question::choice(
            "Roof material?",
            vec![
                QuestionOption::new("tile", "Tile"),
                QuestionOption::new("metal", "Metal"),
            ],
        )
    }

    fn begin_outcome() -> BeginOutcome {
        BeginOutcome {
            session_id: "abc-123".to_string(),
            address: None,
            roof_area_sqm: 120.0,
            question: material(),
            progress: 0,
            total_questions: 6,
        }
    }

    fn final_estimate() -> FinalEstimate {
        FinalEstimate {
            address: "10 Main St".to_string(),
            roof_area_sqm: 120.0,
            cost: EstimateRange::new(10000.0, 15000.0),
            summary: ConversationSummary::new(),
        }
    }

    fn controller(mock: MockEstimationService) -> SessionController {
        SessionController::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_start_appends_three_messages() {
        let mut mock = MockEstimationService::new();
        mock.expect_begin().times(1).returning(|_| Ok(begin_outcome()));

        let controller = controller(mock);
        controller.start_session("10 Main St").await.unwrap();

        let view = controller.snapshot();
        assert_eq!(view.session.status, SessionStatus::Active);
        assert_eq!(view.messages.len(), 3);
        assert_eq!(
            view.messages[0].text,
            "Great! I found your property at 10 Main St. Estimated roof area: 120 m²."
        );
        assert!(view.messages[2].is_question);
        assert!(!view.busy);
    }

    #[tokio::test]
    async fn test_empty_address_never_calls_service() {
        let mut mock = MockEstimationService::new();
        mock.expect_begin().never();

        let controller = controller(mock);
        let err = controller.start_session("   ").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(controller.status(), SessionStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_answer_after_completion_is_rejected_locally() {
        let mut mock = MockEstimationService::new();
        mock.expect_begin().times(1).returning(|_| Ok(begin_outcome()));
        mock.expect_answer()
            .times(1)
            .returning(|_, _| Ok(AnswerOutcome::Completed(final_estimate())));

        let controller = controller(mock);
        controller.start_session("10 Main St").await.unwrap();
        let step = controller.submit_answer("tile").await.unwrap();
        assert!(matches!(step, AnswerStep::Completed(_)));

        let err = controller.submit_answer("metal").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::State(StateError::WrongStatus {
                current: SessionStatus::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_answer_before_start_is_rejected() {
        let mut mock = MockEstimationService::new();
        mock.expect_answer().never();

        let controller = controller(mock);
        let err = controller.submit_answer("tile").await.unwrap_err();
        assert!(matches!(err, SessionError::State(_)));
        assert!(controller.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn test_protocol_error_leaves_state() {
        let mut mock = MockEstimationService::new();
        mock.expect_begin().times(1).returning(|_| Ok(begin_outcome()));
        mock.expect_answer().times(1).returning(|_, _| {
            Ok(AnswerOutcome::Continuing {
                question: material(),
                progress: 9,
                total_questions: Some(6),
                intermediate: None,
            })
        });

        let controller = controller(mock);
        controller.start_session("10 Main St").await.unwrap();
        let before = controller.snapshot();

        let err = controller.submit_answer("tile").await.unwrap_err();
        assert!(matches!(err, SessionError::Service(ServiceError::Protocol(_))));

        let after = controller.snapshot();
        assert_eq!(after.messages, before.messages);
        assert_eq!(after.session, before.session);
        assert_eq!(after.pending_answer, None);
    }

    #[tokio::test]
    async fn test_invalid_intermediate_is_fatal_and_not_committed() {
        let mut mock = MockEstimationService::new();
        mock.expect_begin().times(1).returning(|_| Ok(begin_outcome()));
        mock.expect_answer().times(1).returning(|_, _| {
            Ok(AnswerOutcome::Continuing {
                question: material(),
                progress: 1,
                total_questions: None,
                intermediate: Some(EstimateRange::new(12000.0, 8000.0)),
            })
        });

        let controller = controller(mock);
        controller.start_session("10 Main St").await.unwrap();

        let err = controller.submit_answer("tile").await.unwrap_err();
        assert!(err.is_fatal());
        let view = controller.snapshot();
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.intermediate, None);
        assert_eq!(view.session.progress, 0);
    }

    #[tokio::test]
    async fn test_lead_requires_final_estimate() {
        let mut mock = MockEstimationService::new();
        mock.expect_submit_lead().never();

        let controller = controller(mock);
        controller
            .collect_contact(ContactDraft::new().name("Jane").email("jane@example.com"))
            .unwrap();
        let err = controller.submit_lead().await.unwrap_err();
        assert!(matches!(err, SessionError::State(StateError::NoFinalEstimate)));
    }

    #[tokio::test]
    async fn test_remote_record_requires_session() {
        let mut mock = MockEstimationService::new();
        mock.expect_session_record().never();

        let controller = controller(mock);
        let err = controller.fetch_remote_record().await.unwrap_err();
        assert!(matches!(err, SessionError::State(StateError::NoSession)));
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(SessionConfig::default().call_timeout, Duration::from_secs(15));
    }
}
