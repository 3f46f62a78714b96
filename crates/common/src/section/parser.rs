use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

use super::slug::{segment, SectionIdAllocator};
use crate::types::Heading;

#[derive(Debug, Clone)]
struct HeadingDraft {
    title: String,
    level: u8,
    line: u32,
    line_offset: usize,
}

/// Parse the ATX headings of a markdown document into a flat, document-ordered
/// list with parent links, line ranges and char ranges filled in.
pub fn parse_headings(markdown: &str) -> Vec<Heading> {
    let mut drafts = Vec::new();
    let mut current: Option<HeadingDraft> = None;

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                let line_offset = line_start(markdown, range.start);
                if !is_atx_heading(markdown, line_offset) {
                    current = None;
                    continue;
                }

                current = Some(HeadingDraft {
                    title: String::new(),
                    level: level_to_u8(level),
                    line: line_number_for_offset(markdown, line_offset),
                    line_offset,
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(draft) = current.as_mut() {
                    draft.title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(draft) = current.take() {
                    drafts.push(draft);
                }
            }
            _ => {}
        }
    }

    build_headings(markdown, drafts)
}

/// Assign ids, parents and subtree ranges with a level stack: headings whose
/// level is >= the incoming one are popped, the remaining top is the parent.
fn build_headings(markdown: &str, drafts: Vec<HeadingDraft>) -> Vec<Heading> {
    let total_lines = markdown.lines().count() as u32;
    let char_starts = char_offsets(markdown, drafts.iter().map(|draft| draft.line_offset));
    let total_chars = char_starts.last().copied().unwrap_or(0)
        + markdown[drafts.last().map(|draft| draft.line_offset).unwrap_or(0)..].chars().count();

    let mut ids = SectionIdAllocator::new();
    let mut headings: Vec<Heading> = Vec::with_capacity(drafts.len());
    let mut segments: Vec<String> = Vec::with_capacity(drafts.len());
    let mut stack: Vec<usize> = Vec::new();

    for (index, draft) in drafts.iter().enumerate() {
        while let Some(top) = stack.last().copied() {
            if headings[top].level >= draft.level {
                stack.pop();
            } else {
                break;
            }
        }

        let ancestors: Vec<String> = stack.iter().map(|&i| segments[i].clone()).collect();
        let own_segment = segment(&draft.title, draft.level, index + 1);
        let section_id = ids.allocate(&ancestors, &own_segment);
        let parent_id = stack.last().map(|&parent| headings[parent].section_id.clone());

        let next = drafts[index + 1..].iter().position(|later| later.level <= draft.level);
        let (line_end, char_end) = match next {
            Some(offset) => (drafts[index + 1 + offset].line, char_starts[index + 1 + offset]),
            None => (total_lines + 1, total_chars),
        };

        headings.push(Heading {
            section_id,
            parent_id,
            level: draft.level,
            title: draft.title.trim().to_string(),
            line_start: draft.line,
            line_end,
            char_start: char_starts[index],
            char_end,
        });
        segments.push(own_segment);
        stack.push(index);
    }

    headings
}

/// Convert ascending byte offsets into char offsets in one pass.
fn char_offsets(markdown: &str, byte_offsets: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut out = Vec::new();
    let mut last_byte = 0;
    let mut last_char = 0;
    for byte in byte_offsets {
        last_char += markdown[last_byte..byte].chars().count();
        last_byte = byte;
        out.push(last_char);
    }
    out
}

fn line_start(markdown: &str, offset: usize) -> usize {
    markdown[..offset].rfind('\n').map(|index| index + 1).unwrap_or(0)
}

fn is_atx_heading(markdown: &str, line_offset: usize) -> bool {
    markdown[line_offset..].chars().find(|ch| !ch.is_whitespace()).is_some_and(|ch| ch == '#')
}

fn line_number_for_offset(markdown: &str, offset: usize) -> u32 {
    markdown[..offset].bytes().filter(|byte| *byte == b'\n').count() as u32 + 1
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_headings;

    #[test]
    fn builds_parent_links_and_subtree_ranges() {
        let markdown = "# Root\n\n## Child\n\n### Grandchild\n\n## Sibling\n";
        let headings = parse_headings(markdown);

        assert_eq!(headings.len(), 4);

        assert_eq!(headings[0].section_id, "root");
        assert_eq!(headings[0].parent_id, None);
        assert_eq!(headings[0].line_start, 1);
        assert_eq!(headings[0].line_end, 8);

        assert_eq!(headings[1].section_id, "root/child");
        assert_eq!(headings[1].parent_id.as_deref(), Some("root"));
        assert_eq!(headings[1].line_start, 3);
        assert_eq!(headings[1].line_end, 7);

        assert_eq!(headings[2].section_id, "root/child/grandchild");
        assert_eq!(headings[2].parent_id.as_deref(), Some("root/child"));
        assert_eq!(headings[2].line_end, 7);

        assert_eq!(headings[3].section_id, "root/sibling");
        assert_eq!(headings[3].line_start, 7);
        assert_eq!(headings[3].line_end, 8);
    }

    #[test]
    fn char_ranges_cover_section_text() {
        let markdown = "# A\nThe quick fox jumps.";
        let headings = parse_headings(markdown);

        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].char_start, 0);
        assert_eq!(headings[0].char_end, markdown.chars().count());
    }

    #[test]
    fn char_ranges_count_characters_not_bytes() {
        let markdown = "# Café\nnaïve text\n## Zürich\nmore\n";
        let headings = parse_headings(markdown);

        let second_start = markdown.chars().count() - "## Zürich\nmore\n".chars().count();
        assert_eq!(headings[1].char_start, second_start);
        assert_eq!(headings[1].char_end, markdown.chars().count());
        assert_eq!(headings[1].section_id, "café/zürich");
    }

    #[test]
    fn skipped_levels_nest_under_nearest_shallower_heading() {
        let headings = parse_headings("# A\n### B\n## C\n");

        assert_eq!(headings[1].parent_id.as_deref(), Some("a"));
        assert_eq!(headings[2].parent_id.as_deref(), Some("a"));
        assert_eq!(headings[1].section_id, "a/b");
        assert_eq!(headings[2].section_id, "a/c");
    }

    #[test]
    fn duplicate_headings_get_unique_ids() {
        let headings = parse_headings("# Doc\n## Notes\n## Notes\n");
        assert_eq!(headings[1].section_id, "doc/notes");
        assert_eq!(headings[2].section_id, "doc/notes~2");
    }

    #[test]
    fn empty_heading_uses_fallback_id() {
        let headings = parse_headings("# Doc\n## !!!\n");
        assert_eq!(headings[1].section_id, "doc/h2_2");
    }

    #[test]
    fn ignores_setext_headings() {
        let headings = parse_headings("Title\n=====\n\n# Actual\n");

        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].title, "Actual");
    }

    #[test]
    fn ignores_hash_lines_in_code_blocks_and_html_blocks() {
        let markdown = r#"# Real

```
# Not a section
```

<div>
# Also not a section
</div>

## Next
"#;

        let headings = parse_headings(markdown);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].title, "Real");
        assert_eq!(headings[1].title, "Next");
    }

    #[test]
    fn inline_code_is_part_of_title() {
        let headings = parse_headings("# The `parse` function\n");
        assert_eq!(headings[0].title, "The parse function");
        assert_eq!(headings[0].section_id, "the-parse-function");
    }

    #[test]
    fn document_without_headings_yields_nothing() {
        assert!(parse_headings("just text\n").is_empty());
        assert!(parse_headings("").is_empty());
    }
}
