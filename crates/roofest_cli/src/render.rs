//! Terminal rendering of session state.
//!
//! Pure functions from session data to display strings. Nothing here talks
//! to the controller or the service.

use roofest_session::{
    format_amount, format_area, AnswerValue, Author, ErrorKind, EstimateRange, FinalEstimate,
    LeadReceipt, Message, Question, QuestionKind, RemoteSessionRecord, Session, SessionError,
};

const BAR_WIDTH: usize = 20;

pub fn render_message(message: &Message) -> String {
    match message.author {
        Author::System if message.is_question => format!("❓ {}", message.text),
        Author::System => format!("🏠 {}", message.text),
        Author::User => format!("   🙋 {}", message.text),
    }
}

/// Numbered option list for a question.
pub fn render_options(question: &Question) -> String {
    let mut out = String::new();
    for (i, option) in question.options.iter().enumerate() {
        out.push_str(&format!("   {}. {}\n", i + 1, option.label));
    }
    match question.kind {
        QuestionKind::MultipleChoice => {
            out.push_str("   (several choices allowed, separate them with commas)\n")
        }
        QuestionKind::FreeText => out.push_str("   (type your answer)\n"),
        QuestionKind::SingleChoice => {}
    }
    out
}

pub fn render_progress(session: &Session) -> String {
    let filled = (session.progress_ratio() * BAR_WIDTH as f64).round() as usize;
    format!(
        "Progress {}/{} [{}{}] {:.0}%",
        session.progress,
        session.total_questions,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
        session.progress_ratio() * 100.0
    )
}

pub fn render_range(range: &EstimateRange) -> String {
    format!("{} € - {} €", format_amount(range.min), format_amount(range.max))
}

pub fn render_final(estimate: &FinalEstimate) -> String {
    let mut lines = vec![
        format!("💰 Estimated cost: {}", render_range(&estimate.cost)),
        format!("   Address: {}", estimate.address),
        format!("   Roof area: {} m²", format_area(estimate.roof_area_sqm)),
    ];
    if !estimate.summary.is_empty() {
        lines.push("📋 Your answers:".to_string());
        for (key, value) in estimate.summary.iter() {
            lines.push(format!("   ✓ {}: {}", humanize_key(key), value));
        }
    }
    lines.join("\n")
}

pub fn render_record(record: &RemoteSessionRecord) -> String {
    let mut lines = vec![
        format!("Session {}", record.id),
        format!("   Address: {}", record.address),
    ];
    if let Some(area) = record.roof_area_sqm {
        lines.push(format!("   Roof area: {} m²", format_area(area)));
    }
    lines.push(format!(
        "   Status: {}",
        if record.is_completed { "completed" } else { "in progress" }
    ));
    if let Some(question) = &record.current_question_id {
        lines.push(format!("   Current question: {}", humanize_key(question)));
    }
    if let Some(cost) = &record.estimated_cost {
        lines.push(format!("   Estimate: {}", render_range(cost)));
    }
    for (key, value) in record.answers.iter() {
        lines.push(format!("   ✓ {}: {}", humanize_key(key), value));
    }
    if let Some(created) = record.created_at {
        lines.push(format!("   Started: {}", created.format("%Y-%m-%d %H:%M")));
    }
    if let Some(updated) = record.last_updated {
        lines.push(format!("   Updated: {}", updated.format("%Y-%m-%d %H:%M")));
    }
    lines.join("\n")
}

pub fn render_lead_receipt(receipt: &LeadReceipt) -> String {
    match receipt.id {
        Some(id) => format!("✅ Thank you! A roofer will contact you soon (reference #{}).", id),
        None => "✅ Thank you! A roofer will contact you soon.".to_string(),
    }
}

pub fn render_error(err: &SessionError) -> String {
    match err.kind() {
        ErrorKind::Network => format!(
            "⚠️  The estimation service could not be reached ({}). Please try again.",
            err
        ),
        ErrorKind::Protocol if err.is_fatal() => format!(
            "❌ The estimation service sent inconsistent figures ({}). Please start a new estimate.",
            err
        ),
        ErrorKind::Protocol => format!(
            "⚠️  Unexpected reply from the estimation service ({}). Please try again.",
            err
        ),
        ErrorKind::State => format!("ℹ️  {}", err),
        ErrorKind::Validation => format!("✏️  {}", err),
    }
}

/// `roof_type` becomes `Roof type`.
pub fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Turn typed input into an answer for `question`.
///
/// Options may be picked by number, value or label. Multiple-choice input
/// is comma separated.
pub fn parse_answer(question: &Question, input: &str) -> Result<AnswerValue, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Please enter an answer.".to_string());
    }

    match question.kind {
        QuestionKind::FreeText => Ok(AnswerValue::Single(input.to_string())),
        QuestionKind::SingleChoice => resolve_choice(question, input).map(AnswerValue::Single),
        QuestionKind::MultipleChoice => {
            let mut values: Vec<String> = Vec::new();
            for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let value = resolve_choice(question, part)?;
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            if values.is_empty() {
                return Err("Please pick at least one option.".to_string());
            }
            Ok(AnswerValue::Multiple(values))
        }
    }
}

fn resolve_choice(question: &Question, input: &str) -> Result<String, String> {
    let by_number = input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| question.options.get(i));
    let by_text = || {
        question
            .options
            .iter()
            .find(|o| o.value.eq_ignore_ascii_case(input) || o.label.eq_ignore_ascii_case(input))
    };

    by_number
        .or_else(by_text)
        .map(|o| o.value.clone())
        .ok_or_else(|| format!("'{}' is not one of the options.", input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roofest_session::{
        ConversationSummary, QuestionOption, ServiceError, StateError, SummaryValue,
    };

    fn elements() -> Question {
        Question::multiple_choice(
            "Anything on the roof?",
            vec![
                QuestionOption::new("chimney", "Chimney"),
                QuestionOption::new("skylight", "Skylight"),
                QuestionOption::new("none", "None"),
            ],
        )
    }

    #[test]
    fn test_parse_single_choice() {
        let question = Question::choice(
            "Material?",
            vec![
                QuestionOption::new("tile", "Tile"),
                QuestionOption::new("metal", "Metal"),
            ],
        );
        assert_eq!(parse_answer(&question, "2"), Ok(AnswerValue::from("metal")));
        assert_eq!(parse_answer(&question, "TILE"), Ok(AnswerValue::from("tile")));
        assert!(parse_answer(&question, "0").is_err());
        assert!(parse_answer(&question, "3").is_err());
        assert!(parse_answer(&question, "slate").is_err());
        assert!(parse_answer(&question, "  ").is_err());
    }

    #[test]
    fn test_parse_multiple_choice() {
        let answer = parse_answer(&elements(), "1, skylight, 1").unwrap();
        assert_eq!(
            answer,
            AnswerValue::Multiple(vec!["chimney".to_string(), "skylight".to_string()])
        );
        assert!(parse_answer(&elements(), " , ").is_err());
    }

    #[test]
    fn test_parse_free_text() {
        let question = Question::free_text("Anything else?");
        assert_eq!(
            parse_answer(&question, " north facing "),
            Ok(AnswerValue::from("north facing"))
        );
    }

    #[test]
    fn test_render_options() {
        let rendered = render_options(&elements());
        assert!(rendered.starts_with("   1. Chimney\n   2. Skylight\n"));
        assert!(rendered.contains("commas"));
    }

    #[test]
    fn test_render_progress() {
        let session = Session {
            progress: 3,
            total_questions: 6,
            ..Session::default()
        };
        assert_eq!(
            render_progress(&session),
            "Progress 3/6 [##########----------] 50%"
        );
        assert_eq!(
            render_progress(&Session::default()),
            "Progress 0/0 [--------------------] 0%"
        );
    }

    #[test]
    fn test_render_final() {
        let estimate = FinalEstimate {
            address: "10 Main St".to_string(),
            roof_area_sqm: 120.0,
            cost: EstimateRange::new(10000.0, 15000.0),
            summary: [
                ("roof_type", SummaryValue::Single("tile".to_string())),
                (
                    "roof_elements",
                    SummaryValue::Multiple(vec!["chimney".to_string(), "skylight".to_string()]),
                ),
            ]
            .into_iter()
            .collect::<ConversationSummary>(),
        };

        let rendered = render_final(&estimate);
        assert!(rendered.contains("10,000 € - 15,000 €"));
        assert!(rendered.contains("Roof area: 120 m²"));
        assert!(rendered.contains("✓ Roof type: tile"));
        assert!(rendered.contains("✓ Roof elements: chimney, skylight"));
    }

    #[test]
    fn test_render_record() {
        let record = RemoteSessionRecord {
            id: "abc-123".to_string(),
            address: "10 Main St".to_string(),
            roof_area_sqm: Some(96.5),
            current_question_id: Some("roof_access".to_string()),
            answers: ConversationSummary::new(),
            estimated_cost: Some(EstimateRange::new(8000.0, 12000.0)),
            is_completed: false,
            created_at: Some(Utc::now().naive_utc()),
            last_updated: None,
        };

        let rendered = render_record(&record);
        assert!(rendered.contains("Roof area: 96.5 m²"));
        assert!(rendered.contains("Status: in progress"));
        assert!(rendered.contains("Current question: Roof access"));
        assert!(rendered.contains("Estimate: 8,000 € - 12,000 €"));
        assert!(rendered.contains("Started: "));
        assert!(!rendered.contains("Updated: "));
    }

    #[test]
    fn test_render_error_by_kind() {
        let network = SessionError::from(ServiceError::transport("connection refused"));
        assert!(render_error(&network).contains("try again"));

        let fatal = SessionError::Integrity("minimum 300 exceeds maximum 200".to_string());
        assert!(render_error(&fatal).contains("start a new estimate"));

        let state = SessionError::from(StateError::NoPendingQuestion);
        assert!(render_error(&state).starts_with("ℹ️"));
    }

    #[test]
    fn test_messages_and_keys() {
        assert_eq!(humanize_key("roof_type"), "Roof type");
        assert_eq!(humanize_key(""), "");
        assert_eq!(
            render_lead_receipt(&LeadReceipt { id: Some(7) }),
            "✅ Thank you! A roofer will contact you soon (reference #7)."
        );
    }
}
