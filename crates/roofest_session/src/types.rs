//! Core domain types shared by the session components.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session exists yet, or the previous one was reset
    #[default]
    Uninitialized,
    /// Questions are being asked
    Active,
    /// The final estimate has been produced
    Completed,
}

/// How a question expects to be answered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    FreeText,
}

/// One selectable answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionOption {
    /// Raw value sent back to the service
    pub value: String,
    /// Text shown to the user
    pub label: String,
}

impl QuestionOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// A question returned by the Estimation Service.
///
/// Option order is significant and kept exactly as received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    /// Server-side question identifier, when provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Prompt text
    pub prompt: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl Question {
    /// Create a single-choice question.
    pub fn choice(prompt: impl Into<String>, options: Vec<QuestionOption>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
            kind: QuestionKind::SingleChoice,
            options,
        }
    }

    /// Create a multiple-choice question.
    pub fn multiple_choice(prompt: impl Into<String>, options: Vec<QuestionOption>) -> Self {
        Self {
            kind: QuestionKind::MultipleChoice,
            ..Self::choice(prompt, options)
        }
    }

    /// Create a free-text question.
    pub fn free_text(prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
            kind: QuestionKind::FreeText,
            options: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Find the option carrying `value`.
    pub fn option(&self, value: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.value == value)
    }

    /// Resolve an answer to the text shown in the timeline.
    ///
    /// Values without a matching option are shown as-is.
    pub fn label_for(&self, answer: &AnswerValue) -> String {
        let resolve = |value: &str| {
            self.option(value)
                .map(|o| o.label.clone())
                .unwrap_or_else(|| value.to_string())
        };

        match answer {
            AnswerValue::Single(value) => resolve(value.as_str()),
            AnswerValue::Multiple(values) => values
                .iter()
                .map(|v| resolve(v.as_str()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Raw answer sent to the Estimation Service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AnswerValue {
    /// True when there is nothing to send.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Single(value) => value.trim().is_empty(),
            Self::Multiple(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for AnswerValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

/// A cost range in euros.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EstimateRange {
    pub min: f64,
    pub max: f64,
}

impl EstimateRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check `0 <= min <= max` with finite bounds.
    pub fn validate(&self) -> Result<(), String> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(format!(
                "estimate bounds must be finite (min={}, max={})",
                self.min, self.max
            ));
        }
        if self.min < 0.0 {
            return Err(format!("estimate minimum {} is negative", self.min));
        }
        if self.min > self.max {
            return Err(format!(
                "estimate minimum {} exceeds maximum {}",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

/// Terminal estimate produced when questioning completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalEstimate {
    pub address: String,
    pub roof_area_sqm: f64,
    pub cost: EstimateRange,
    /// Answers keyed by question id, in the order the service listed them
    pub summary: ConversationSummary,
}

/// A recorded answer in a conversation summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SummaryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl fmt::Display for SummaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => f.write_str(value),
            Self::Multiple(values) => f.write_str(&values.join(", ")),
        }
    }
}

/// Ordered mapping of question id to answer.
///
/// Serialized as a JSON object; key order is preserved both ways.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationSummary {
    entries: Vec<(String, SummaryValue)>,
}

impl ConversationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: SummaryValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SummaryValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SummaryValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, SummaryValue)> for ConversationSummary {
    fn from_iter<I: IntoIterator<Item = (K, SummaryValue)>>(iter: I) -> Self {
        let mut summary = Self::new();
        for (key, value) in iter {
            summary.insert(key, value);
        }
        summary
    }
}

impl Serialize for ConversationSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConversationSummary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SummaryVisitor;

        impl<'de> Visitor<'de> for SummaryVisitor {
            type Value = ConversationSummary;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of question ids to a string or a list of strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut summary = ConversationSummary::new();
                while let Some((key, value)) = access.next_entry::<String, SummaryValue>()? {
                    summary.insert(key, value);
                }
                Ok(summary)
            }
        }

        deserializer.deserialize_map(SummaryVisitor)
    }
}

/// Client-side view of the session owned by the controller.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Session {
    /// Server-issued id, the only correlation key with the service
    pub id: Option<String>,
    pub status: SessionStatus,
    pub address: Option<String>,
    pub roof_area_sqm: Option<f64>,
    pub current_question: Option<Question>,
    pub progress: u32,
    pub total_questions: u32,
}

impl Session {
    /// Fraction of questions answered, in `[0, 1]`.
    pub fn progress_ratio(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        f64::from(self.progress.min(self.total_questions)) / f64::from(self.total_questions)
    }
}

/// Format a euro amount with thousands separators, e.g. `12,500`.
pub fn format_amount(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let (whole, fraction) = (cents / 100, cents % 100);

    let mut out = String::new();
    if value < 0.0 && cents > 0 {
        out.push('-');
    }
    out.push_str(&group_thousands(&whole.to_string()));
    if fraction != 0 {
        out.push_str(&format!(".{:02}", fraction));
    }
    out
}

/// Format a surface in square metres without a trailing `.0`.
pub fn format_area(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material_question() -> Question {
        Question::choice(
            "Roof material?",
            vec![
                QuestionOption::new("tile", "Tile"),
                QuestionOption::new("metal", "Metal"),
            ],
        )
    }

    #[test]
    fn test_label_resolution() {
        let question = material_question();
        assert_eq!(question.label_for(&"tile".into()), "Tile");
        assert_eq!(question.label_for(&"slate".into()), "slate");

        let multi = AnswerValue::Multiple(vec!["metal".to_string(), "tile".to_string()]);
        assert_eq!(question.label_for(&multi), "Metal, Tile");
    }

    #[test]
    fn test_blank_answers() {
        assert!(AnswerValue::from("  ").is_blank());
        assert!(AnswerValue::Multiple(vec![]).is_blank());
        assert!(!AnswerValue::from("tile").is_blank());
    }

    #[test]
    fn test_range_validation() {
        assert!(EstimateRange::new(8000.0, 12000.0).validate().is_ok());
        assert!(EstimateRange::new(0.0, 0.0).validate().is_ok());
        assert!(EstimateRange::new(-1.0, 10.0).validate().is_err());
        assert!(EstimateRange::new(10.0, 5.0).validate().is_err());
        assert!(EstimateRange::new(f64::NAN, 5.0).validate().is_err());
    }

    #[test]
    fn test_summary_preserves_order() {
        let json = r#"{"roof_type":"ardoise","roof_elements":["cheminee","lucarne"],"insulation":"non"}"#;
        let summary: ConversationSummary = serde_json::from_str(json).unwrap();

        let keys: Vec<_> = summary.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["roof_type", "roof_elements", "insulation"]);
        assert_eq!(
            summary.get("roof_elements"),
            Some(&SummaryValue::Multiple(vec![
                "cheminee".to_string(),
                "lucarne".to_string()
            ]))
        );
        assert_eq!(serde_json::to_string(&summary).unwrap(), json);
    }

    #[test]
    fn test_summary_rejects_numbers() {
        let result = serde_json::from_str::<ConversationSummary>(r#"{"roof_type": 3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_progress_ratio() {
        let mut session = Session::default();
        assert_eq!(session.progress_ratio(), 0.0);

        session.progress = 3;
        session.total_questions = 6;
        assert!((session.progress_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_amount_formatting() {
        assert_eq!(format_amount(8000.0), "8,000");
        assert_eq!(format_amount(12500.0), "12,500");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(1234567.0), "1,234,567");
        assert_eq!(format_amount(1500.5), "1,500.50");
        assert_eq!(format_area(120.0), "120");
        assert_eq!(format_area(96.5), "96.5");
    }
}
