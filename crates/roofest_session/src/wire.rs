//! JSON payloads exchanged with the Estimation Service.
//!
//! Raw payloads are deserialized leniently (every field optional) and then
//! checked here, so a missing or mistyped field surfaces as a
//! [`ServiceError::Protocol`] naming the field instead of a generic decode
//! failure. Range ordering is left to the estimation tracker.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};
use crate::lead::LeadRequest;
use crate::service::{AnswerOutcome, BeginOutcome, LeadReceipt, RemoteSessionRecord};
use crate::types::{
    AnswerValue, ConversationSummary, EstimateRange, FinalEstimate, Question, QuestionKind,
    QuestionOption,
};

/// Body of `POST /api/conversation/start`.
#[derive(Debug, Serialize)]
pub struct BeginRequest<'a> {
    pub address: &'a str,
}

/// Body of `POST /api/conversation/answer`.
#[derive(Debug, Serialize)]
pub struct AnswerRequest<'a> {
    pub session_id: &'a str,
    pub answer: &'a AnswerValue,
}

/// Body of `POST /api/leads`.
#[derive(Debug, Serialize)]
pub struct LeadSubmission<'a> {
    pub address: &'a str,
    pub roof_area_sqm: f64,
    pub estimated_cost_min: f64,
    pub estimated_cost_max: f64,
    pub client_name: &'a str,
    pub client_email: &'a str,
    pub client_phone: Option<&'a str>,
    pub conversation_history: &'a str,
}

impl<'a> From<&'a LeadRequest> for LeadSubmission<'a> {
    fn from(lead: &'a LeadRequest) -> Self {
        Self {
            address: &lead.estimate.address,
            roof_area_sqm: lead.estimate.roof_area_sqm,
            estimated_cost_min: lead.estimate.cost.min,
            estimated_cost_max: lead.estimate.cost.max,
            client_name: &lead.contact.name,
            client_email: &lead.contact.email,
            client_phone: lead.contact.phone.as_deref(),
            conversation_history: &lead.conversation_history,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOption {
    value: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: Option<String>,
    question: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    options: Option<Vec<RawOption>>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFinal {
    address: Option<String>,
    roof_area_sqm: Option<f64>,
    estimated_cost_min: Option<f64>,
    estimated_cost_max: Option<f64>,
    conversation_summary: Option<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
struct RawBegin {
    session_id: Option<String>,
    address: Option<String>,
    roof_area_sqm: Option<f64>,
    question: Option<RawQuestion>,
    progress: Option<u32>,
    total_questions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    session_id: Option<String>,
    completed: Option<bool>,
    question: Option<RawQuestion>,
    progress: Option<u32>,
    total_questions: Option<u32>,
    intermediate_estimation: Option<RawRange>,
    final_estimation: Option<RawFinal>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    id: Option<String>,
    address: Option<String>,
    roof_area_sqm: Option<f64>,
    current_question_id: Option<String>,
    conversation_data: Option<ConversationSummary>,
    estimated_cost_min: Option<f64>,
    estimated_cost_max: Option<f64>,
    is_completed: Option<bool>,
    timestamp: Option<NaiveDateTime>,
    last_updated: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    error: Option<String>,
}

fn parse<T: DeserializeOwned>(bytes: &[u8], what: &str) -> ServiceResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ServiceError::protocol(format!("malformed {} payload: {}", what, e)))
}

fn required<T>(value: Option<T>, field: &str) -> ServiceResult<T> {
    value.ok_or_else(|| ServiceError::protocol(format!("missing field `{}`", field)))
}

impl RawQuestion {
    fn decode(self) -> ServiceResult<Question> {
        let prompt = required(self.question, "question.question")?;
        let options = self
            .options
            .unwrap_or_default()
            .into_iter()
            .map(|raw| {
                let value = required(raw.value, "question.options.value")?;
                let label = raw.label.unwrap_or_else(|| value.clone());
                Ok(QuestionOption::new(value, label))
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        let kind = match self.kind.as_deref() {
            Some("choice") | Some("single_choice") => QuestionKind::SingleChoice,
            Some("multiple_choice") => QuestionKind::MultipleChoice,
            Some("text") | Some("free_text") => QuestionKind::FreeText,
            _ if options.is_empty() => QuestionKind::FreeText,
            _ => QuestionKind::SingleChoice,
        };
        if kind != QuestionKind::FreeText && options.is_empty() {
            return Err(ServiceError::protocol("choice question carries no options"));
        }

        Ok(Question {
            id: self.id,
            prompt,
            kind,
            options,
        })
    }
}

impl RawRange {
    fn decode(self, field: &str) -> ServiceResult<EstimateRange> {
        Ok(EstimateRange::new(
            required(self.min, &format!("{}.min", field))?,
            required(self.max, &format!("{}.max", field))?,
        ))
    }
}

impl RawFinal {
    fn decode(self) -> ServiceResult<FinalEstimate> {
        Ok(FinalEstimate {
            address: required(self.address, "final_estimation.address")?,
            roof_area_sqm: required(self.roof_area_sqm, "final_estimation.roof_area_sqm")?,
            cost: EstimateRange::new(
                required(self.estimated_cost_min, "final_estimation.estimated_cost_min")?,
                required(self.estimated_cost_max, "final_estimation.estimated_cost_max")?,
            ),
            summary: self.conversation_summary.unwrap_or_default(),
        })
    }
}

/// Decode the reply to a Begin call.
pub fn decode_begin(bytes: &[u8]) -> ServiceResult<BeginOutcome> {
    let raw: RawBegin = parse(bytes, "start")?;
    Ok(BeginOutcome {
        session_id: required(raw.session_id, "session_id")?,
        address: raw.address,
        roof_area_sqm: required(raw.roof_area_sqm, "roof_area_sqm")?,
        question: required(raw.question, "question")?.decode()?,
        progress: required(raw.progress, "progress")?,
        total_questions: required(raw.total_questions, "total_questions")?,
    })
}

/// Decode the reply to an Answer call sent for `expected_session_id`.
pub fn decode_answer(bytes: &[u8], expected_session_id: &str) -> ServiceResult<AnswerOutcome> {
    let raw: RawAnswer = parse(bytes, "answer")?;

    if let Some(session_id) = raw.session_id.as_deref() {
        if session_id != expected_session_id {
            return Err(ServiceError::protocol(format!(
                "reply is for session {} instead of {}",
                session_id, expected_session_id
            )));
        }
    }

    if raw.completed.unwrap_or(false) {
        let estimate = required(raw.final_estimation, "final_estimation")?.decode()?;
        return Ok(AnswerOutcome::Completed(estimate));
    }

    Ok(AnswerOutcome::Continuing {
        question: required(raw.question, "question")?.decode()?,
        progress: required(raw.progress, "progress")?,
        total_questions: raw.total_questions,
        intermediate: raw
            .intermediate_estimation
            .map(|range| range.decode("intermediate_estimation"))
            .transpose()?,
    })
}

/// Decode a stored lead. Only the id is kept, and only when present.
pub fn decode_lead_receipt(bytes: &[u8]) -> LeadReceipt {
    let id = serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|value| value.get("id").and_then(serde_json::Value::as_i64));
    LeadReceipt { id }
}

/// Decode the service's stored record of a session.
pub fn decode_session_record(bytes: &[u8]) -> ServiceResult<RemoteSessionRecord> {
    let raw: RawRecord = parse(bytes, "session record")?;
    let estimated_cost = match (raw.estimated_cost_min, raw.estimated_cost_max) {
        (Some(min), Some(max)) => Some(EstimateRange::new(min, max)),
        _ => None,
    };

    Ok(RemoteSessionRecord {
        id: required(raw.id, "id")?,
        address: required(raw.address, "address")?,
        roof_area_sqm: raw.roof_area_sqm,
        current_question_id: raw.current_question_id,
        answers: raw.conversation_data.unwrap_or_default(),
        estimated_cost,
        is_completed: raw.is_completed.unwrap_or(false),
        created_at: raw.timestamp,
        last_updated: raw.last_updated,
    })
}

/// Build the error for a non-success reply.
pub fn decode_error(status: u16, bytes: &[u8]) -> ServiceError {
    let message = serde_json::from_slice::<RawError>(bytes)
        .ok()
        .and_then(|raw| raw.error)
        .unwrap_or_else(|| {
            let body = String::from_utf8_lossy(bytes).trim().to_string();
            if body.is_empty() {
                "no error message".to_string()
            } else {
                body.chars().take(200).collect()
            }
        });
    ServiceError::Status { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::{ContactInfo, EstimateSnapshot};
    use crate::types::SummaryValue;

    const START: &str = r#"{
        "session_id": "abc-123",
        "address": "10 Main St",
        "roof_area_sqm": 120,
        "question": {
            "id": "roof_type",
            "question": "Roof material?",
            "type": "choice",
            "options": [
                {"value": "tile", "label": "Tile"},
                {"value": "metal", "label": "Metal"}
            ],
            "next_question": "roof_condition"
        },
        "progress": 1,
        "total_questions": 6
    }"#;

    #[test]
    fn test_decode_begin() {
        let outcome = decode_begin(START.as_bytes()).unwrap();
        assert_eq!(outcome.session_id, "abc-123");
        assert_eq!(outcome.roof_area_sqm, 120.0);
        assert_eq!(outcome.progress, 1);
        assert_eq!(outcome.total_questions, 6);
        assert_eq!(outcome.question.id.as_deref(), Some("roof_type"));
        assert_eq!(outcome.question.kind, QuestionKind::SingleChoice);
        assert_eq!(outcome.question.options[1].label, "Metal");
    }

    #[test]
    fn test_begin_missing_question_is_protocol_error() {
        let err = decode_begin(br#"{"session_id":"a","roof_area_sqm":90,"progress":1,"total_questions":6}"#)
            .unwrap_err();
        assert_eq!(err, ServiceError::protocol("missing field `question`"));
    }

    #[test]
    fn test_mistyped_field_is_protocol_error() {
        let err = decode_begin(br#"{"session_id":"a","roof_area_sqm":"big"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    #[test]
    fn test_decode_continuing_answer() {
        let body = br#"{
            "session_id": "abc-123",
            "question": {
                "id": "roof_elements",
                "question": "Anything on the roof?",
                "type": "multiple_choice",
                "options": [{"value": "chimney", "label": "Chimney"}]
            },
            "progress": 3,
            "total_questions": 6,
            "intermediate_estimation": {"min": 8000, "max": 12000}
        }"#;

        match decode_answer(body, "abc-123").unwrap() {
            AnswerOutcome::Continuing {
                question,
                progress,
                total_questions,
                intermediate,
            } => {
                assert_eq!(question.kind, QuestionKind::MultipleChoice);
                assert_eq!(progress, 3);
                assert_eq!(total_questions, Some(6));
                assert_eq!(intermediate, Some(EstimateRange::new(8000.0, 12000.0)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_decode_completed_answer() {
        let body = br#"{
            "session_id": "abc-123",
            "completed": true,
            "final_estimation": {
                "address": "10 Main St",
                "roof_area_sqm": 120,
                "estimated_cost_min": 10000,
                "estimated_cost_max": 15000,
                "conversation_summary": {"roof_type": "tile", "roof_elements": ["chimney"]}
            }
        }"#;

        let AnswerOutcome::Completed(estimate) = decode_answer(body, "abc-123").unwrap() else {
            panic!("expected a completed outcome");
        };
        assert_eq!(estimate.cost, EstimateRange::new(10000.0, 15000.0));
        assert_eq!(
            estimate.summary.get("roof_elements"),
            Some(&SummaryValue::Multiple(vec!["chimney".to_string()]))
        );
    }

    #[test]
    fn test_completed_without_final_is_protocol_error() {
        let err = decode_answer(br#"{"completed": true}"#, "abc").unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    #[test]
    fn test_session_mismatch_is_protocol_error() {
        let body = br#"{"session_id":"other","question":{"question":"?"},"progress":2}"#;
        let err = decode_answer(body, "abc-123").unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(m) if m.contains("other")));
    }

    #[test]
    fn test_inverted_range_is_decoded_as_is() {
        let body = br#"{"question":{"question":"Next?"},"progress":2,
            "intermediate_estimation":{"min":300,"max":200}}"#;
        let AnswerOutcome::Continuing { intermediate, question, .. } =
            decode_answer(body, "abc").unwrap()
        else {
            panic!("expected a continuing outcome");
        };
        assert_eq!(intermediate, Some(EstimateRange::new(300.0, 200.0)));
        assert_eq!(question.kind, QuestionKind::FreeText);
    }

    #[test]
    fn test_choice_without_options_is_rejected() {
        let body = br#"{"question":{"question":"Pick","type":"choice","options":[]},"progress":2}"#;
        assert!(decode_answer(body, "abc").is_err());
    }

    #[test]
    fn test_decode_session_record() {
        let body = br#"{
            "id": "abc-123",
            "address": "10 Main St",
            "latitude": 48.85,
            "roof_area_sqm": 120.0,
            "current_question_id": null,
            "conversation_data": {"roof_type": "tile"},
            "estimated_cost_min": 10000,
            "estimated_cost_max": 15000,
            "is_completed": true,
            "timestamp": "2024-05-01T10:00:00.123456",
            "last_updated": null
        }"#;

        let record = decode_session_record(body).unwrap();
        assert!(record.is_completed);
        assert_eq!(record.estimated_cost, Some(EstimateRange::new(10000.0, 15000.0)));
        assert_eq!(record.answers.len(), 1);
        assert!(record.created_at.is_some());
        assert!(record.last_updated.is_none());
    }

    #[test]
    fn test_lead_receipt_is_lenient() {
        assert_eq!(decode_lead_receipt(br#"{"id": 42, "address": "x"}"#).id, Some(42));
        assert_eq!(decode_lead_receipt(b"").id, None);
    }

    #[test]
    fn test_error_body() {
        let err = decode_error(404, br#"{"error": "Session not found"}"#);
        assert_eq!(
            err,
            ServiceError::Status {
                status: 404,
                message: "Session not found".to_string()
            }
        );

        let err = decode_error(502, b"");
        assert!(matches!(err, ServiceError::Status { status: 502, .. }));
    }

    #[test]
    fn test_lead_submission_fields() {
        let lead = LeadRequest {
            contact: ContactInfo {
                name: "Jane".to_string(),
                email: "jane@example.com".to_string(),
                phone: None,
            },
            estimate: EstimateSnapshot {
                address: "10 Main St".to_string(),
                roof_area_sqm: 120.0,
                cost: EstimateRange::new(10000.0, 15000.0),
            },
            conversation_history: "{}".to_string(),
        };

        let value = serde_json::to_value(LeadSubmission::from(&lead)).unwrap();
        assert_eq!(value["client_name"], "Jane");
        assert_eq!(value["estimated_cost_max"], 15000.0);
        assert!(value["client_phone"].is_null());
        assert_eq!(value["conversation_history"], "{}");
    }
}
