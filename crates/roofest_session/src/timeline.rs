//! Append-only message timeline.
//!
//! The timeline is the conversational record shown to the user and the
//! transcript attached to a lead submission. Entries are never reordered,
//! edited or deduplicated.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    System,
    User,
}

/// A single timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Position-derived identifier, strictly increasing
    pub id: u64,
    pub author: Author,
    pub text: String,
    /// Whether this message asks the user something
    pub is_question: bool,
    pub created_at: DateTime<Utc>,
}

/// A message that has not been appended yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub author: Author,
    pub text: String,
    pub is_question: bool,
}

impl Draft {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            author: Author::System,
            text: text.into(),
            is_question: false,
        }
    }

    pub fn question(text: impl Into<String>) -> Self {
        Self {
            author: Author::System,
            text: text.into(),
            is_question: true,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            text: text.into(),
            is_question: false,
        }
    }
}

/// Ordered log of exchanged messages.
#[derive(Debug, Clone, Default)]
pub struct MessageTimeline {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a message at the end and return its id.
    ///
    /// Timestamps are nudged forward when the clock has not advanced since
    /// the previous entry, so both ids and timestamps strictly increase.
    pub fn append(&mut self, draft: Draft) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;

        let mut created_at = Utc::now();
        if let Some(last) = self.messages.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + Duration::microseconds(1);
            }
        }

        self.messages.push(Message {
            id,
            author: draft.author,
            text: draft.text,
            is_question: draft.is_question,
            created_at,
        });
        id
    }

    /// Append several messages in order.
    pub fn extend(&mut self, drafts: impl IntoIterator<Item = Draft>) {
        for draft in drafts {
            self.append(draft);
        }
    }

    /// Read-only view in append order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages appended after the given id.
    pub fn since(&self, id: u64) -> &[Message] {
        let start = self.messages.partition_point(|m| m.id <= id);
        &self.messages[start..]
    }

    /// Serialize the transcript as a JSON array, in append order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.messages)
    }
}
