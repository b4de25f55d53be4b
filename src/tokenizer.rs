// ✂️ Segment Tokenizer - split multi-value cells into segments
//
// Two cell dialects:
// - comma-delimited: "A1 : x, B2 : y"            (labels never contain ", ")
// - position-scan:   "310 : a, b, 311 : c"       (labels may contain commas)
//
// Segments are borrowed slices of the cell and come out lazily, in source order.

use crate::entities::is_siret;
use crate::error::SegmentError;
use regex::{Matches, Regex};
use std::iter::Peekable;
use std::sync::LazyLock;

const COMMA_SEPARATOR: &str = ", ";
const CODE_SEPARATOR: &str = " : ";
const NAME_SEPARATOR: &str = " - ";

/// Word boundary, digits, then any alphanumerics: "310", "31054", "320t"
static CODE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+\w*\b").expect("code token pattern is valid")
});

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit run pattern is valid"));

// ============================================================================
// CODE PARSER
// ============================================================================

/// First contiguous run of decimal digits, or None
pub fn parse_code(raw: &str) -> Option<&str> {
    DIGIT_RUN.find(raw).map(|m| m.as_str())
}

// ============================================================================
// SEGMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Split on the literal ", "
    CommaDelimited,

    /// Cut at the start of every code-like token
    PositionScan,
}

/// Lazy, single-pass iterator over the raw segments of one cell
pub struct Segments<'a> {
    inner: SegmentsInner<'a>,
}

enum SegmentsInner<'a> {
    Comma(std::str::Split<'a, &'static str>),
    Scan {
        text: &'a str,
        matches: Peekable<Matches<'static, 'a>>,
    },
}

impl<'a> Segments<'a> {
    pub fn new(cell: &'a str, mode: SplitMode) -> Self {
        let inner = match mode {
            SplitMode::CommaDelimited => SegmentsInner::Comma(cell.split(COMMA_SEPARATOR)),
            SplitMode::PositionScan => SegmentsInner::Scan {
                text: cell,
                matches: CODE_TOKEN.find_iter(cell).peekable(),
            },
        };
        Segments { inner }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        match &mut self.inner {
            SegmentsInner::Comma(split) => {
                // blank pieces ("" cells, trailing ", ") carry nothing
                split.map(str::trim).find(|s| !s.is_empty())
            }
            SegmentsInner::Scan { text, matches } => {
                let text: &'a str = *text;
                let current = matches.next()?;
                let end = matches.peek().map_or(text.len(), |m| m.start());
                Some(text[current.start()..end].trim())
            }
        }
    }
}

// ============================================================================
// CODE : LABEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLabel<'a> {
    pub code: &'a str,
    pub label: &'a str,
}

/// Split a segment on the first " : " and clean both halves
pub fn split_code_label(segment: &str) -> Result<CodeLabel<'_>, SegmentError> {
    let (code, label) = segment
        .split_once(CODE_SEPARATOR)
        .ok_or_else(|| SegmentError::MissingCodeSeparator(segment.to_string()))?;

    let code = code.trim();
    if code.is_empty() {
        return Err(SegmentError::EmptyCode(segment.to_string()));
    }

    Ok(CodeLabel {
        code,
        label: clean_label(label),
    })
}

/// Strip whitespace, trailing commas and surrounding quotes
pub fn clean_label(raw: &str) -> &str {
    raw.trim()
        .trim_end_matches(',')
        .trim_end()
        .trim_matches('"')
        .trim()
}

/// Tokenize a whole cell into (code, label) pairs; malformed segments come back as errors
pub fn code_labels(
    cell: &str,
    mode: SplitMode,
) -> impl Iterator<Item = Result<CodeLabel<'_>, SegmentError>> {
    Segments::new(cell, mode).map(split_code_label)
}

// ============================================================================
// NAME - IDENTIFIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartnerToken<'a> {
    pub name: &'a str,

    /// Present only when the trailing token is all digits
    pub siret: Option<&'a str>,
}

/// Split "Name - 12345678901234" on the last " - "; names may contain " - " themselves
pub fn split_partner(segment: &str) -> Result<PartnerToken<'_>, SegmentError> {
    let (name, token) = segment
        .rsplit_once(NAME_SEPARATOR)
        .ok_or_else(|| SegmentError::MissingNameSeparator(segment.to_string()))?;

    let token = token.trim();
    Ok(PartnerToken {
        name: name.trim(),
        siret: is_siret(token).then_some(token),
    })
}

/// Tokenize a certifier cell into partner tokens
pub fn partners(cell: &str) -> impl Iterator<Item = Result<PartnerToken<'_>, SegmentError>> {
    Segments::new(cell, SplitMode::CommaDelimited).map(split_partner)
}

/// Count of code-like tokens in a cell (one position-scan segment per token)
pub fn code_token_count(cell: &str) -> usize {
    CODE_TOKEN.find_iter(cell).count()
}
