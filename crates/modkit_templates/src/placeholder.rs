//! Placeholder scanning and substitution.
//!
//! A placeholder is an identifier wrapped in double braces, e.g.
//! `{{mod_id}}`. Spaces directly inside the braces are tolerated
//! (`{{ mod_id }}`). Substitution is a single pass over the input: values
//! are inserted verbatim and never scanned again, so a value containing
//! `{{...}}` cannot trigger further expansion.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::context::SubstitutionContext;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const SNIPPET_CHARS: usize = 32;

/// Why a placeholder could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// `{{` without a matching `}}`.
    Unterminated,
    /// A second `{{` before the first one was closed.
    Nested,
    /// `}}` without an opening `{{`.
    UnmatchedClose,
    EmptyIdentifier,
    InvalidIdentifier,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MalformedReason::Unterminated => "opening '{{' is never closed",
            MalformedReason::Nested => "nested placeholders are not supported",
            MalformedReason::UnmatchedClose => "closing '}}' without an opening '{{'",
            MalformedReason::EmptyIdentifier => "placeholder has no identifier",
            MalformedReason::InvalidIdentifier => {
                "identifier must match [A-Za-z_][A-Za-z0-9_]*"
            }
        };
        f.write_str(msg)
    }
}

/// Substitution engine errors. Offsets are byte offsets into the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("malformed placeholder at byte {offset} ({snippet:?}): {reason}")]
    Malformed {
        offset: usize,
        snippet: String,
        reason: MalformedReason,
    },

    #[error("unresolved placeholder {{{{{name}}}}} at byte {offset}")]
    Unresolved { name: String, offset: usize },
}

/// A piece of tokenized template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder { name: &'a str, offset: usize },
}

/// Output of a successful substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Every identifier the input referenced.
    pub referenced: BTreeSet<String>,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is a valid regex")
    })
}

/// Whether `name` is a valid placeholder identifier.
pub fn is_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

fn malformed(text: &str, offset: usize, reason: MalformedReason) -> PlaceholderError {
    PlaceholderError::Malformed {
        offset,
        snippet: text[offset..].chars().take(SNIPPET_CHARS).collect(),
        reason,
    }
}

/// Split `text` into literal and placeholder segments.
pub fn tokenize(text: &str) -> Result<Vec<Segment<'_>>, PlaceholderError> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    loop {
        let open = text[cursor..].find(OPEN).map(|p| p + cursor);
        let close = text[cursor..].find(CLOSE).map(|p| p + cursor);

        if let Some(close) = close {
            if open.map_or(true, |o| close < o) {
                return Err(malformed(text, close, MalformedReason::UnmatchedClose));
            }
        }
        let Some(open) = open else {
            break;
        };

        let inner_start = open + OPEN.len();
        let end = text[inner_start..]
            .find(CLOSE)
            .map(|p| p + inner_start)
            .ok_or_else(|| malformed(text, open, MalformedReason::Unterminated))?;

        let inner = &text[inner_start..end];
        if inner.contains(OPEN) {
            return Err(malformed(text, open, MalformedReason::Nested));
        }

        let name = inner.trim_matches(' ');
        if name.is_empty() {
            return Err(malformed(text, open, MalformedReason::EmptyIdentifier));
        }
        if !is_identifier(name) {
            return Err(malformed(text, open, MalformedReason::InvalidIdentifier));
        }

        if open > cursor {
            segments.push(Segment::Literal(&text[cursor..open]));
        }
        segments.push(Segment::Placeholder { name, offset: open });
        cursor = end + CLOSE.len();
    }

    if cursor < text.len() {
        segments.push(Segment::Literal(&text[cursor..]));
    }

    Ok(segments)
}

/// Identifiers referenced by `text`, without resolving them.
pub fn placeholders(text: &str) -> Result<BTreeSet<&str>, PlaceholderError> {
    Ok(tokenize(text)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder { name, .. } => Some(name),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Substitute every placeholder in `text` with its value from `context`.
pub fn render(text: &str, context: &SubstitutionContext) -> Result<Rendered, PlaceholderError> {
    render_with(text, |name| context.get(name).map(Cow::Borrowed))
}

/// Substitute every placeholder in `text` using `resolve` for lookups.
pub fn render_with<'v, F>(text: &str, mut resolve: F) -> Result<Rendered, PlaceholderError>
where
    F: FnMut(&str) -> Option<Cow<'v, str>>,
{
    let segments = tokenize(text)?;
    let mut output = String::with_capacity(text.len());
    let mut referenced = BTreeSet::new();

    for segment in segments {
        match segment {
            Segment::Literal(literal) => output.push_str(literal),
            Segment::Placeholder { name, offset } => {
                let value = resolve(name).ok_or_else(|| PlaceholderError::Unresolved {
                    name: name.to_string(),
                    offset,
                })?;
                output.push_str(&value);
                referenced.insert(name.to_string());
            }
        }
    }

    Ok(Rendered {
        text: output,
        referenced,
    })
}
