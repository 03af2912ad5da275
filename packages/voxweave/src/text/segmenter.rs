//! Single-pass narration/dialogue segmenter.
//!
//! `*...*` is narration, `"..."` is character speech and everything between
//! them is ambiguous. A bracketed span needs at least one character inside
//! and may contain neither delimiter. Unclosed or empty delimiters are left
//! in the surrounding ambiguous text.

use voxweave_domain::{SpanKind, TextSpan};

/// Lazily yields spans of `text` in document order.
#[derive(Debug, Clone)]
pub struct Segmenter<'a> {
    text: &'a str,
    /// Start of text not yet emitted.
    cursor: usize,
    /// Where the next delimiter search begins.
    scan: usize,
    /// Bracketed span found but not yet yielded, queued behind the
    /// ambiguous text preceding it.
    pending: Option<TextSpan>,
}

impl<'a> Segmenter<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            cursor: 0,
            scan: 0,
            pending: None,
        }
    }

    /// Next bracketed match at or after `self.scan`, as `(open, close)` byte
    /// offsets of the delimiters.
    fn next_match(&mut self) -> Option<(usize, usize)> {
        let bytes = self.text.as_bytes();
        let mut i = self.scan;
        while i < bytes.len() {
            let open = bytes[i];
            if open != b'*' && open != b'"' {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] != b'*' && bytes[j] != b'"' {
                j += 1;
            }
            if j == bytes.len() {
                return None;
            }
            if bytes[j] == open && j > i + 1 {
                return Some((i, j));
            }
            // No delimiter between i and j, so no match can start there.
            i = j;
        }
        None
    }
}

fn trimmed(kind: SpanKind, raw: &str) -> Option<TextSpan> {
    let content = raw.trim();
    (!content.is_empty()).then(|| TextSpan::new(kind, content))
}

impl Iterator for Segmenter<'_> {
    type Item = TextSpan;

    fn next(&mut self) -> Option<TextSpan> {
        loop {
            if let Some(span) = self.pending.take() {
                return Some(span);
            }
            if self.cursor >= self.text.len() {
                return None;
            }

            let Some((open, close)) = self.next_match() else {
                let rest = &self.text[self.cursor..];
                self.cursor = self.text.len();
                self.scan = self.cursor;
                match trimmed(SpanKind::Ambiguous, rest) {
                    Some(span) => return Some(span),
                    None => continue,
                }
            };

            let kind = if self.text.as_bytes()[open] == b'*' {
                SpanKind::Narrator
            } else {
                SpanKind::Character
            };
            let before = &self.text[self.cursor..open];
            self.pending = trimmed(kind, &self.text[open + 1..close]);
            self.cursor = close + 1;
            self.scan = self.cursor;

            if let Some(span) = trimmed(SpanKind::Ambiguous, before) {
                return Some(span);
            }
        }
    }
}

impl std::iter::FusedIterator for Segmenter<'_> {}

/// Split `text` into voice-tagged spans.
///
/// Short spans are kept; dispatch decides what is too short to voice.
pub fn segment(text: &str) -> Vec<TextSpan> {
    Segmenter::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_paragraph() {
        let spans = segment(
            "The door creaked. \"Hello,\" she said, *a shiver ran through the room*.",
        );
        assert_eq!(
            spans,
            vec![
                TextSpan::ambiguous("The door creaked."),
                TextSpan::character("Hello,"),
                TextSpan::ambiguous("she said,"),
                TextSpan::narrator("a shiver ran through the room"),
                TextSpan::ambiguous("."),
            ]
        );
    }

    #[test]
    fn plain_text_is_one_ambiguous_span() {
        assert_eq!(
            segment("  just words  "),
            vec![TextSpan::ambiguous("just words")]
        );
        assert!(segment("   ").is_empty());
        assert!(segment("").is_empty());
    }

    #[test]
    fn unclosed_and_empty_delimiters_stay_ambiguous() {
        assert_eq!(
            segment("He said \"wait"),
            vec![TextSpan::ambiguous("He said \"wait")]
        );
        // The empty `**` cannot match, so its second star opens the span.
        assert_eq!(
            segment("** then *bold*"),
            vec![
                TextSpan::ambiguous("*"),
                TextSpan::narrator("then"),
                TextSpan::ambiguous("bold*"),
            ]
        );
    }

    #[test]
    fn mismatched_delimiters_do_not_pair() {
        // `*` cannot close a `"`; the scan resumes at the `*`.
        assert_eq!(
            segment("\"a* b*"),
            vec![TextSpan::ambiguous("\"a"), TextSpan::narrator("b")]
        );
    }

    #[test]
    fn whitespace_only_match_is_dropped() {
        assert_eq!(
            segment("one * * two"),
            vec![TextSpan::ambiguous("one"), TextSpan::ambiguous("two")]
        );
    }

    #[test]
    fn multibyte_text_is_sliced_safely() {
        let spans = segment("Café «bonjour» \"¿qué tal?\" *sourit*");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1], TextSpan::character("¿qué tal?"));
        assert_eq!(spans[2], TextSpan::narrator("sourit"));
    }
}
