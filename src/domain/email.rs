//! Email domain types.
//!
//! A corpus email is a flat JSON record. The body is what gets indexed;
//! the other fields travel with search hits so the assistant can cite them.

use serde::{Deserialize, Serialize};

/// One email of the synthetic corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Free-form send date as written by the generator.
    #[serde(default)]
    pub date: String,
    /// Email subject line.
    #[serde(default)]
    pub subject: String,
    /// Sender address.
    #[serde(default)]
    pub from: String,
    /// Plain text body content.
    pub body: String,
}

impl EmailRecord {
    /// Creates a record from its four fields.
    pub fn new(
        date: impl Into<String>,
        subject: impl Into<String>,
        from: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            subject: subject.into(),
            from: from.into(),
            body: body.into(),
        }
    }

    /// Short preview of the body, at most `max_chars` characters.
    pub fn snippet(&self, max_chars: usize) -> String {
        let mut snippet: String = self.body.chars().take(max_chars).collect();
        if self.body.chars().count() > max_chars {
            snippet.push('…');
        }
        snippet
    }
}
