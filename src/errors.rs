//! Shared diagnostic surface
//!
//! Both analysis phases report through `Diagnostic`: a stable code, the
//! phase that produced it, a rendered message, the span it anchors to, and
//! the found/expected types when the error is about a type. The first error
//! wins in each phase, so a diagnostic always describes exactly one defect.
//!
//! Also home to the Levenshtein machinery behind "did you mean?"
//! suggestions, which both phases use for unknown-name reporting.

use std::fmt;

use crate::ast::{SourceMap, Span};
use crate::canonical::CanonError;
use crate::check::TypeError;

// ============================================================================
// Diagnostics
// ============================================================================

/// Which analysis phase produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Canonical,
    Typecheck,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Canonical => write!(f, "canonical"),
            Phase::Typecheck => write!(f, "typecheck"),
        }
    }
}

/// A phase error lifted into the common reporting shape
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: &'static str,
    pub phase: Phase,
    pub message: String,
    pub span: Option<Span>,
    /// Rendered form of the offending type, when the error has one
    pub found: Option<String>,
    /// Rendered form of the type that was required instead
    pub expected: Option<String>,
}

impl Diagnostic {
    /// Render as `phase error [CODE] at L:C-C: message`, or without the
    /// location for diagnostics that have no span (file-level rules).
    pub fn render(&self, sources: &SourceMap) -> String {
        match &self.span {
            Some(span) => format!(
                "{} error [{}] at {}: {}",
                self.phase,
                self.code,
                sources.locate(span),
                self.message
            ),
            None => format!("{} error [{}]: {}", self.phase, self.code, self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error [{}]: {}", self.phase, self.code, self.message)
    }
}

impl From<CanonError> for Diagnostic {
    fn from(err: CanonError) -> Diagnostic {
        Diagnostic {
            code: err.code(),
            phase: Phase::Canonical,
            message: err.to_string(),
            span: err.span().cloned(),
            found: None,
            expected: None,
        }
    }
}

impl From<TypeError> for Diagnostic {
    fn from(err: TypeError) -> Diagnostic {
        let (found, expected) = match &err {
            TypeError::Mismatch {
                expected, found, ..
            } => (Some(found.to_string()), Some(expected.to_string())),
            TypeError::NotAFunction { found, .. }
            | TypeError::NotARecord { found, .. }
            | TypeError::NotAList { found, .. }
            | TypeError::BadOperand { found, .. } => (Some(found.to_string()), None),
            TypeError::UnknownField { record, .. } => (Some(record.to_string()), None),
            _ => (None, None),
        };
        Diagnostic {
            code: err.code(),
            phase: Phase::Typecheck,
            message: err.to_string(),
            span: Some(err.span().clone()),
            found,
            expected,
        }
    }
}

// ============================================================================
// Name suggestions
// ============================================================================

/// Compute the Levenshtein edit distance between two strings
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr_row[0] = i;
        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr_row[j] = (prev_row[j] + 1)
                .min(curr_row[j - 1] + 1)
                .min(prev_row[j - 1] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find candidates within `max_distance` edits of `name`, closest first,
/// ties broken alphabetically. Exact matches and anything past three
/// suggestions are dropped.
pub fn find_similar<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    max_distance: usize,
) -> Vec<String> {
    let mut matches: Vec<(usize, String)> = candidates
        .into_iter()
        .filter(|c| *c != name)
        .filter_map(|c| {
            let dist = levenshtein_distance(name, c);
            if dist <= max_distance {
                Some((dist, c.to_string()))
            } else {
                None
            }
        })
        .collect();

    matches.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    matches.truncate(3);
    matches.into_iter().map(|(_, s)| s).collect()
}
