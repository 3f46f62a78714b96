// Navigable section tree built from the flat heading list.

use serde::{Deserialize, Serialize};

use crate::types::Heading;

/// A section and the sections nested beneath it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionNode {
    pub heading: Heading,
    pub children: Vec<SectionNode>,
}

/// Nest headings by level.
///
/// For each heading, every open node whose level is >= the heading's level
/// is closed and attached to the node below it (or to the roots), then the
/// heading is opened. Level skips (H1 → H3) nest under the nearest
/// shallower heading.
pub fn build_section_tree(headings: &[Heading]) -> Vec<SectionNode> {
    let mut roots: Vec<SectionNode> = Vec::new();
    let mut open: Vec<SectionNode> = Vec::new();

    for heading in headings {
        while open.last().is_some_and(|node| node.heading.level >= heading.level) {
            close_top(&mut open, &mut roots);
        }
        open.push(SectionNode { heading: heading.clone(), children: Vec::new() });
    }

    while !open.is_empty() {
        close_top(&mut open, &mut roots);
    }

    roots
}

fn close_top(open: &mut Vec<SectionNode>, roots: &mut Vec<SectionNode>) {
    if let Some(node) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::parser::parse_headings;

    fn titles(nodes: &[SectionNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.heading.title.as_str()).collect()
    }

    #[test]
    fn level_skip_nests_under_shallower_heading() {
        let tree = build_section_tree(&parse_headings("# A\n### B\n## C\n"));

        assert_eq!(titles(&tree), vec!["A"]);
        assert_eq!(titles(&tree[0].children), vec!["B", "C"]);
        assert!(tree[0].children[0].children.is_empty());
    }

    #[test]
    fn multiple_roots_and_deep_nesting() {
        let tree = build_section_tree(&parse_headings(
            "# One\n## One.A\n### One.A.i\n# Two\n## Two.A\n",
        ));

        assert_eq!(titles(&tree), vec!["One", "Two"]);
        assert_eq!(titles(&tree[0].children), vec!["One.A"]);
        assert_eq!(titles(&tree[0].children[0].children), vec!["One.A.i"]);
        assert_eq!(titles(&tree[1].children), vec!["Two.A"]);
    }

    #[test]
    fn document_starting_below_h1_still_has_roots() {
        let tree = build_section_tree(&parse_headings("### Deep\n## Shallower\n"));
        assert_eq!(titles(&tree), vec!["Deep", "Shallower"]);
    }

    #[test]
    fn nested_nodes_keep_their_section_ids() {
        let tree = build_section_tree(&parse_headings("# A\n## B\n### C\n"));
        let deepest = &tree[0].children[0].children[0];
        assert_eq!(deepest.heading.section_id, "a/b/c");
        assert!(deepest.children.is_empty());
    }

    #[test]
    fn empty_input_builds_empty_tree() {
        assert!(build_section_tree(&[]).is_empty());
    }
}
