//! Voice-tagged span of narration text.
use serde::{Deserialize, Serialize};

/// Who should speak a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Enclosed in `*...*`.
    Narrator,
    /// Enclosed in `"..."`.
    Character,
    /// Outside any delimiters; the request decides who voices it.
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub kind: SpanKind,
    pub content: String,
}

impl TextSpan {
    pub fn new(kind: SpanKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn narrator(content: impl Into<String>) -> Self {
        Self::new(SpanKind::Narrator, content)
    }

    pub fn character(content: impl Into<String>) -> Self {
        Self::new(SpanKind::Character, content)
    }

    pub fn ambiguous(content: impl Into<String>) -> Self {
        Self::new(SpanKind::Ambiguous, content)
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Which voice takes [`SpanKind::Ambiguous`] spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousVoice {
    #[default]
    Character,
    Narrator,
}

impl AmbiguousVoice {
    /// Resolve a span kind to the voice role that speaks it.
    pub fn role_for(self, kind: SpanKind) -> SpanKind {
        match kind {
            SpanKind::Ambiguous => match self {
                Self::Character => SpanKind::Character,
                Self::Narrator => SpanKind::Narrator,
            },
            other => other,
        }
    }
}
