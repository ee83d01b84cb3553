/// Paragraph classification rules for the semantic chunker.
///
/// Each classifier is a pure function over a single paragraph, applied in a
/// fixed order, so the heuristics can be tested against an input/expected
/// table instead of being buried in the chunking loop.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Headings longer than this are never treated as headings.
const MAX_HEADING_LEN: usize = 100;

/// Punctuation that ends a sentence. A line ending in one of these is body
/// text, not a heading.
pub const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '…'];

static MARKDOWN_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+\S").expect("valid regex"));

static NUMBERED_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*[.)]?\s+\S").expect("valid regex"));

static LETTERED_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][.)]\s+\S").expect("valid regex"));

static ROMAN_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[IVXLCM]{1,7}[.)]\s+\S").expect("valid regex"));

static BRACKETED_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\[[^\]]+\]|【[^】]+】)$").expect("valid regex"));

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([-*•·]|\d+[.)]|[a-z][.)])\s+\S").expect("valid regex"));

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid regex"));

/// Phrases that open a paragraph on a new topic. Matched case-insensitively
/// against the start of the paragraph.
const TOPIC_CHANGE_INDICATORS: &[&str] = &[
    "however",
    "in contrast",
    "on the other hand",
    "meanwhile",
    "moving on",
    "in conclusion",
    "in summary",
    "as a result",
    "turning to",
    "next,",
    "finally,",
];

/// Whether a paragraph is a heading.
///
/// Eligibility gate first (single line, short, no trailing sentence
/// punctuation), then the ordered pattern set.
#[must_use]
pub fn is_heading(para: &str) -> bool {
    let para = para.trim();
    if para.is_empty() || para.contains('\n') || para.chars().count() >= MAX_HEADING_LEN {
        return false;
    }
    if para.ends_with(SENTENCE_TERMINATORS) {
        return false;
    }

    MARKDOWN_HEADER.is_match(para)
        || NUMBERED_SECTION.is_match(para)
        || LETTERED_SECTION.is_match(para)
        || ROMAN_SECTION.is_match(para)
        || BRACKETED_TITLE.is_match(para)
        || is_all_caps(para)
}

/// ALL-CAPS heading rule: at least one letter, every letter uppercase.
fn is_all_caps(line: &str) -> bool {
    let mut has_letter = false;
    for c in line.chars() {
        if c.is_alphabetic() {
            has_letter = true;
            if c.is_lowercase() {
                return false;
            }
        }
    }
    has_letter
}

/// Strip markdown markers, numbering, and brackets from a heading to get a
/// displayable section title.
#[must_use]
pub fn heading_title(para: &str) -> String {
    let mut title = para.trim();

    title = title.trim_start_matches('#').trim_start();
    title = title
        .trim_start_matches(['[', '【'])
        .trim_end_matches([']', '】']);

    // Drop a leading "1.2.3", "A.", "IV)" style section number
    if let Some(rest) = title.split_once(char::is_whitespace).and_then(|(num, rest)| {
        let is_numbering = num
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ')' | 'I' | 'V' | 'X'))
            || (num.len() == 2 && num.ends_with(['.', ')']));
        is_numbering.then_some(rest)
    }) {
        title = rest;
    }

    title.trim().to_string()
}

/// Whether a paragraph is a bullet or numbered list.
///
/// A single line must open with a list marker; a multi-line paragraph is a
/// list when the majority of its lines do.
#[must_use]
pub fn is_list(para: &str) -> bool {
    let lines: Vec<&str> = para.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }
    let matching = lines.iter().filter(|l| LIST_ITEM.is_match(l)).count();
    matching * 2 > lines.len()
}

/// Whether a paragraph looks like a pipe-delimited table.
#[must_use]
pub fn is_table(para: &str) -> bool {
    let lines: Vec<&str> = para.lines().filter(|l| !l.trim().is_empty()).collect();
    lines.len() >= 2 && lines.iter().filter(|l| l.contains('|')).count() >= 2
}

/// Lowercase keyword set for topic comparison: tokens of length >= 2.
#[must_use]
pub fn keyword_set(text: &str) -> HashSet<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() >= 2)
        .collect()
}

/// Jaccard similarity of two keyword sets. Two empty sets compare as 1.0
/// (no evidence of a topic change).
#[must_use]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 1.0;
    }
    intersection as f32 / union as f32
}

/// Whether a paragraph opens with a known topic-change indicator phrase.
#[must_use]
pub fn opens_topic_change(para: &str) -> bool {
    let lowered = para.trim_start().to_lowercase();
    TOPIC_CHANGE_INDICATORS
        .iter()
        .any(|phrase| lowered.starts_with(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_classification_table() {
        // (input, expected is_heading)
        let cases = [
            ("# Introduction", true),
            ("## Getting Started", true),
            ("1. Overview", true),
            ("2.3 Memory Layout", true),
            ("A. Appendix", true),
            ("IV. Results", true),
            ("[Chapter One]", true),
            ("【第一章】", true),
            ("RELEASE NOTES", true),
            ("This is a normal sentence that ends properly.", false),
            ("Short line without punctuation but lowercase words", false),
            ("# Heading that ends with a period.", false),
            ("Multi\nline\nparagraph", false),
            ("", false),
        ];

        for (input, expected) in cases {
            assert_eq!(
                is_heading(input),
                expected,
                "classification mismatch for {input:?}"
            );
        }
    }

    #[test]
    fn test_heading_rejects_long_lines() {
        let long = "A ".repeat(60);
        assert!(!is_heading(&long));
    }

    #[test]
    fn test_heading_title_cleanup() {
        assert_eq!(heading_title("# Introduction"), "Introduction");
        assert_eq!(heading_title("### Deep Dive"), "Deep Dive");
        assert_eq!(heading_title("1.2 Memory Layout"), "Memory Layout");
        assert_eq!(heading_title("A. Appendix"), "Appendix");
        assert_eq!(heading_title("[Chapter One]"), "Chapter One");
        assert_eq!(heading_title("OVERVIEW"), "OVERVIEW");
    }

    #[test]
    fn test_list_classification_table() {
        let cases = [
            ("- first item\n- second item", true),
            ("* one\n* two\n* three", true),
            ("1. step one\n2. step two", true),
            ("• bullet", true),
            ("Just a plain paragraph of text.", false),
            ("- one list line\nplus two\nplain lines", false),
        ];

        for (input, expected) in cases {
            assert_eq!(is_list(input), expected, "list mismatch for {input:?}");
        }
    }

    #[test]
    fn test_table_detection() {
        assert!(is_table("| a | b |\n|---|---|\n| 1 | 2 |"));
        assert!(!is_table("just one | pipe in a single line"));
        assert!(!is_table("no pipes at all\non two lines"));
    }

    #[test]
    fn test_keyword_set() {
        let set = keyword_set("The quick brown Fox! A fox.");
        assert!(set.contains("quick"));
        assert!(set.contains("fox"));
        assert!(set.contains("the"));
        // Single-character tokens are dropped
        assert!(!set.contains("a"));
    }

    #[test]
    fn test_jaccard() {
        let a = keyword_set("rust memory safety");
        let b = keyword_set("rust memory safety");
        assert!((jaccard(&a, &b) - 1.0).abs() < f32::EPSILON);

        let c = keyword_set("cooking pasta recipes");
        assert!(jaccard(&a, &c) < 0.01);

        let empty = HashSet::new();
        assert!((jaccard(&empty, &empty) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_topic_change_indicators() {
        assert!(opens_topic_change("However, the results differ."));
        assert!(opens_topic_change("on the other hand we see"));
        assert!(!opens_topic_change("The same topic continues here."));
    }
}
