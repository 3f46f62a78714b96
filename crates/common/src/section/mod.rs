// Markdown section structure: heading parser, section ids, section tree.

pub mod parser;
pub mod slug;
pub mod tree;

use crate::types::Heading;

/// Look up a heading by its section id.
pub fn find_heading<'a>(headings: &'a [Heading], section_id: &str) -> Option<&'a Heading> {
    headings.iter().find(|heading| heading.section_id == section_id)
}

/// The deepest section whose range contains `offset`.
///
/// Section ranges cover their whole subtree, so the containing heading that
/// starts last is the innermost one.
pub fn innermost_at(headings: &[Heading], offset: usize) -> Option<&Heading> {
    headings
        .iter()
        .filter(|heading| heading.contains(offset))
        .max_by_key(|heading| heading.char_start)
}
