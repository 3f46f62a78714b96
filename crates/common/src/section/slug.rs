// Section slug generation and stable section ID allocation.
//
// Slugs: lowercase, non-alphanumeric runs become a single hyphen.
// Fallback: h{level}_{ordinal} when heading text has no alphanumerics.
// Section ID: ancestor segments joined by `/`, `~N` suffix on duplicates.

use std::collections::HashMap;

/// Convert a heading string into a slug.
///
/// Unicode letters and digits are kept (lowercased); everything else
/// separates words. Returns an empty string if nothing alphanumeric remains.
pub fn slugify(heading: &str) -> String {
    let mut slug = String::with_capacity(heading.len());
    let mut pending_hyphen = false;

    for ch in heading.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// The path segment a heading contributes to its own and its descendants' ids.
pub fn segment(heading: &str, level: u8, ordinal: usize) -> String {
    let slug = slugify(heading);
    if slug.is_empty() {
        format!("h{level}_{ordinal}")
    } else {
        slug
    }
}

/// Hands out unique section ids for one document.
///
/// The first heading to claim an id gets it unchanged; later headings with
/// the same ancestor chain and slug get `~2`, `~3`, ...
#[derive(Debug, Default)]
pub struct SectionIdAllocator {
    claimed: HashMap<String, usize>,
}

impl SectionIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for a section given its ancestors' segments (root first).
    pub fn allocate(&mut self, ancestor_segments: &[String], own_segment: &str) -> String {
        let base = if ancestor_segments.is_empty() {
            own_segment.to_string()
        } else {
            format!("{}/{}", ancestor_segments.join("/"), own_segment)
        };

        let occurrence = self.claimed.entry(base.clone()).or_insert(0);
        *occurrence += 1;
        if *occurrence == 1 {
            base
        } else {
            format!("{base}~{occurrence}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── slugify ──────────────────────────────────────────────────────

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("API: Authentication (v2)"), "api-authentication-v2");
    }

    #[test]
    fn slugify_collapses_and_trims_separators() {
        assert_eq!(slugify("a---b"), "a-b");
        assert_eq!(slugify("  --spaced  out--  "), "spaced-out");
    }

    #[test]
    fn slugify_keeps_unicode_letters() {
        assert_eq!(slugify("Über Cool"), "über-cool");
        assert_eq!(slugify("日本語"), "日本語");
    }

    #[test]
    fn slugify_returns_empty_without_alphanumerics() {
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("!@#$%"), "");
        assert_eq!(slugify(""), "");
    }

    // ── segment ──────────────────────────────────────────────────────

    #[test]
    fn segment_falls_back_to_level_and_ordinal() {
        assert_eq!(segment("Phase 2: Setup", 2, 1), "phase-2-setup");
        assert_eq!(segment("---", 3, 7), "h3_7");
    }

    // ── SectionIdAllocator ───────────────────────────────────────────

    #[test]
    fn allocator_builds_ancestor_chain() {
        let mut ids = SectionIdAllocator::new();
        assert_eq!(ids.allocate(&[], "root"), "root");
        assert_eq!(ids.allocate(&["root".into(), "api".into()], "auth"), "root/api/auth");
    }

    #[test]
    fn allocator_disambiguates_duplicates() {
        let mut ids = SectionIdAllocator::new();
        let parent = vec!["doc".to_string()];
        assert_eq!(ids.allocate(&parent, "overview"), "doc/overview");
        assert_eq!(ids.allocate(&parent, "overview"), "doc/overview~2");
        assert_eq!(ids.allocate(&parent, "overview"), "doc/overview~3");
        assert_eq!(ids.allocate(&[], "overview"), "overview");
    }
}
