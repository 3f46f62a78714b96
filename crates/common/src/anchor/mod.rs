// Quote anchoring: relocate a recorded selection inside an edited document.
//
// Matching is by content, never by stored offset. A quote that no longer
// occurs verbatim resolves to `NotFound`; the resolver does not fall back to
// fuzzy or nearby spans.
//
// A section hint restricts the search to that section whenever the quote
// occurs there. Candidate ordering when it occurs more than once:
//   1. exact prefix+suffix context match
//   2. more context characters matching
//   3. earlier in the document

use serde::{Deserialize, Serialize};

use crate::section::{find_heading, innermost_at};
use crate::types::Heading;

/// Characters of surrounding context captured and compared on each side.
pub const CONTEXT_CHARS: usize = 32;

/// What an annotation points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorTarget {
    File,
    Section {
        section_id: String,
    },
    Selection {
        quote: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        section_id_hint: Option<String>,
    },
}

/// Char range `[start, end)` an anchor resolved to, or `NotFound`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Resolution {
    Ok { start: usize, end: usize },
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// The resolved range, if any.
    pub fn range(&self) -> Option<(usize, usize)> {
        match *self {
            Self::Ok { start, end } => Some((start, end)),
            Self::NotFound => None,
        }
    }
}

/// Resolve `anchor` against the document's current text and headings.
pub fn resolve(text: &str, headings: &[Heading], anchor: &AnchorTarget) -> Resolution {
    match anchor {
        AnchorTarget::File => Resolution::Ok { start: 0, end: text.chars().count() },
        AnchorTarget::Section { section_id } => match find_heading(headings, section_id) {
            Some(heading) => {
                let total = text.chars().count();
                let start = heading.char_start.min(total);
                Resolution::Ok { start, end: heading.char_end.clamp(start, total) }
            }
            None => Resolution::NotFound,
        },
        AnchorTarget::Selection { quote, prefix, suffix, section_id_hint } => resolve_selection(
            text,
            headings,
            quote,
            prefix.as_deref(),
            suffix.as_deref(),
            section_id_hint.as_deref(),
        ),
    }
}

/// Build a selection anchor for the char range `[start, end)` of `text`.
///
/// Returns `None` for an empty or out-of-range selection.
pub fn capture_selection(
    text: &str,
    headings: &[Heading],
    start: usize,
    end: usize,
) -> Option<AnchorTarget> {
    if start >= end {
        return None;
    }
    let byte_start = byte_offset(text, start)?;
    let byte_end = byte_offset(text, end)?;

    let before = &text[..byte_start];
    let prefix_start = before
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map(|(index, _)| index)
        .unwrap_or(0);
    let prefix = &before[prefix_start..];
    let suffix: String = text[byte_end..].chars().take(CONTEXT_CHARS).collect();

    Some(AnchorTarget::Selection {
        quote: text[byte_start..byte_end].to_string(),
        prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
        suffix: (!suffix.is_empty()).then_some(suffix),
        section_id_hint: innermost_at(headings, start).map(|heading| heading.section_id.clone()),
    })
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    byte_start: usize,
    exact: bool,
    context_score: usize,
}

fn resolve_selection(
    text: &str,
    headings: &[Heading],
    quote: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
    section_id_hint: Option<&str>,
) -> Resolution {
    if quote.is_empty() {
        return Resolution::NotFound;
    }

    let hint_window = section_id_hint
        .and_then(|id| find_heading(headings, id))
        .and_then(|heading| section_byte_window(text, heading));

    let mut starts = hint_window
        .map(|(from, to)| occurrences(text, quote, from, to))
        .unwrap_or_default();
    if starts.is_empty() {
        starts = occurrences(text, quote, 0, text.len());
    }

    let chosen = match starts.as_slice() {
        [] => return Resolution::NotFound,
        [only] => *only,
        _ => {
            let best = starts
                .iter()
                .map(|&byte_start| score_candidate(text, quote, byte_start, prefix, suffix))
                .max_by(|a, b| {
                    a.exact
                        .cmp(&b.exact)
                        .then(a.context_score.cmp(&b.context_score))
                        .then(b.byte_start.cmp(&a.byte_start))
                });
            match best {
                Some(candidate) => candidate.byte_start,
                None => return Resolution::NotFound,
            }
        }
    };

    let start = text[..chosen].chars().count();
    Resolution::Ok { start, end: start + quote.chars().count() }
}

fn score_candidate(
    text: &str,
    quote: &str,
    byte_start: usize,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> Candidate {
    let byte_end = byte_start + quote.len();
    let before = &text[..byte_start];
    let after = &text[byte_end..];

    let prefix_match = prefix.map(|stored| {
        let wanted: Vec<char> = stored.chars().rev().take(CONTEXT_CHARS).collect();
        let matched = wanted.iter().zip(before.chars().rev()).take_while(|(a, b)| *a == b).count();
        (matched, matched == wanted.len())
    });
    let suffix_match = suffix.map(|stored| {
        let wanted: Vec<char> = stored.chars().take(CONTEXT_CHARS).collect();
        let matched = wanted.iter().zip(after.chars()).take_while(|(a, b)| *a == b).count();
        (matched, matched == wanted.len())
    });

    let has_context = prefix_match.is_some() || suffix_match.is_some();
    let exact = has_context
        && prefix_match.is_none_or(|(_, full)| full)
        && suffix_match.is_none_or(|(_, full)| full);
    let context_score = prefix_match.map_or(0, |(n, _)| n) + suffix_match.map_or(0, |(n, _)| n);

    Candidate { byte_start, exact, context_score }
}

/// Every (possibly overlapping) byte offset in `[from, to)` where `quote` fits
/// entirely inside the window.
fn occurrences(text: &str, quote: &str, from: usize, to: usize) -> Vec<usize> {
    let mut found = Vec::new();
    let mut cursor = from;
    while cursor < to {
        let Some(relative) = text[cursor..to].find(quote) else {
            break;
        };
        let at = cursor + relative;
        found.push(at);
        let step = text[at..].chars().next().map_or(1, char::len_utf8);
        cursor = at + step;
    }
    found
}

/// Byte bounds of a section's char range, clamped to the text.
fn section_byte_window(text: &str, heading: &Heading) -> Option<(usize, usize)> {
    let from = byte_offset(text, heading.char_start)?;
    let to = byte_offset(text, heading.char_end).unwrap_or(text.len());
    (from < to).then_some((from, to))
}

/// Byte offset of the `chars`-th character; `text.len()` for one past the end.
fn byte_offset(text: &str, chars: usize) -> Option<usize> {
    text.char_indices().map(|(index, _)| index).chain(std::iter::once(text.len())).nth(chars)
}
