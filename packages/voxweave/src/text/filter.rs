//! Text clean-up modes applied before synthesis.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use voxweave_domain::TextFiltering;

static ELLIPSIS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").expect("valid regex"));
static REPEATED_BANG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").expect("valid regex"));
static REPEATED_QUESTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?{2,}").expect("valid regex"));
static REPEATED_DOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("valid regex"));
static NEWLINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid regex")
});

fn named_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "hellip" => "…",
        "mdash" => "—",
        "ndash" => "–",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        "laquo" => "«",
        "raquo" => "»",
        "copy" => "©",
        "reg" => "®",
        "eacute" => "é",
        "egrave" => "è",
        "agrave" => "à",
        "ccedil" => "ç",
        _ => return None,
    })
}

/// Decode numeric and common named HTML character references. Unknown
/// entities are left as written.
pub fn decode_html_entities(text: &str) -> Cow<'_, str> {
    ENTITY_RE.replace_all(text, |caps: &Captures<'_>| {
        let body = &caps[1];
        let hex = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X"));
        let decoded = if let Some(hex) = hex {
            u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
        } else if let Some(dec) = body.strip_prefix('#') {
            dec.parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
        } else {
            named_entity(body).map(String::from)
        };
        decoded.unwrap_or_else(|| caps[0].to_string())
    })
}

/// Normalisation run on narration text before segmentation: entity
/// decoding and ellipsis collapse.
pub fn prepare_narration(text: &str) -> String {
    let decoded = decode_html_entities(text);
    ELLIPSIS_RE.replace_all(&decoded, ".").into_owned()
}

/// Collapse repeated `!`, `?` or `.` and fold newlines into spaces.
pub fn clean_segment(text: &str) -> String {
    let text = REPEATED_BANG_RE.replace_all(text, "!");
    let text = REPEATED_QUESTION_RE.replace_all(&text, "?");
    let text = REPEATED_DOT_RE.replace_all(&text, ".");
    NEWLINES_RE.replace_all(&text, " ").into_owned()
}

/// Strip emphasis markers and squash paragraph breaks.
fn strip_markup(text: &str) -> String {
    text.replace('*', "")
        .replace("\n\n", "\n")
        .replace("&#x27;", "'")
}

pub fn apply_filtering(mode: TextFiltering, text: &str) -> String {
    match mode {
        TextFiltering::None => text.to_string(),
        TextFiltering::Standard => clean_segment(text),
        TextFiltering::Html => clean_segment(&decode_html_entities(&strip_markup(text))),
    }
}
