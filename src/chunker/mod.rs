//! Semantic chunker: pure text → chunks transformation.
//!
//! Splits a document into paragraph-aligned chunks along heading and topic
//! boundaries, keeps chunk sizes inside the configured bounds, and carries a
//! sentence overlap from the previous chunk for embedding context. No side
//! effects; the same input and config always produce the same output.

pub mod rules;

use std::collections::HashSet;

use crate::config::ChunkingConfig;

/// Coarse paragraph category carried on every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Heading,
    Content,
    List,
    Table,
}

/// Intermediate chunk produced by [`chunk`]. Never persisted as-is; the
/// ingestion pipeline embeds `context_prefix + content` and stores `content`.
#[derive(Debug, Clone)]
pub struct SemanticChunk {
    pub content: String,
    pub index: usize,
    pub kind: ChunkKind,
    pub section_title: Option<String>,
    /// Trailing sentences of the previous chunk, for embedding continuity.
    /// Not counted toward chunk size limits. Empty for the first chunk.
    pub context_prefix: String,
}

struct Paragraph {
    text: String,
    char_len: usize,
    heading: bool,
    list: bool,
    table: bool,
    keywords: HashSet<String>,
    section: Option<String>,
}

struct Group {
    text: String,
    char_len: usize,
    kind: ChunkKind,
    section: Option<String>,
}

/// Split `text` into an ordered sequence of semantic chunks.
///
/// Blank or empty input yields an empty sequence. A whole document shorter
/// than `min_chunk_size` yields exactly one chunk regardless of the minimum.
#[must_use]
pub fn chunk(text: &str, cfg: &ChunkingConfig) -> Vec<SemanticChunk> {
    let paragraphs = split_paragraphs(text, cfg);
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let groups = group_paragraphs(&paragraphs, cfg);
    let mut chunks = accumulate(&groups, cfg);
    apply_context_prefixes(&mut chunks, cfg.overlap_sentences);
    chunks
}

// ── Paragraph splitting & classification ─────────────────────────────

fn split_paragraphs(text: &str, cfg: &ChunkingConfig) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |lines: &mut Vec<&str>, out: &mut Vec<Paragraph>| {
        if lines.is_empty() {
            return;
        }
        let text = lines.join("\n").trim().to_string();
        lines.clear();
        if text.is_empty() {
            return;
        }
        let heading = cfg.detect_headings && rules::is_heading(&text);
        out.push(Paragraph {
            char_len: text.chars().count(),
            heading,
            list: rules::is_list(&text),
            table: rules::is_table(&text),
            keywords: rules::keyword_set(&text),
            section: None,
            text,
        });
    };

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush(&mut current, &mut paragraphs);

    // Attach the most recent heading's title to each paragraph
    let mut section: Option<String> = None;
    for p in &mut paragraphs {
        if p.heading {
            section = Some(rules::heading_title(&p.text));
        }
        p.section = section.clone();
    }

    paragraphs
}

// ── Grouping ─────────────────────────────────────────────────────────

/// Group consecutive paragraphs that stay on one topic. A new group starts
/// at a heading, when the running group would exceed the target size, or
/// (once the group has reached the minimum size) at a topic boundary.
fn group_paragraphs(paragraphs: &[Paragraph], cfg: &ChunkingConfig) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut members: Vec<&Paragraph> = Vec::new();
    let mut members_len = 0usize;

    let flush = |members: &mut Vec<&Paragraph>, groups: &mut Vec<Group>| {
        if members.is_empty() {
            return;
        }
        let text = members
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        groups.push(Group {
            char_len: text.chars().count(),
            kind: group_kind(members),
            section: members[0].section.clone(),
            text,
        });
        members.clear();
    };

    for (i, para) in paragraphs.iter().enumerate() {
        let mut boundary = false;

        if cfg.detect_headings && para.heading {
            boundary = true;
        } else if !members.is_empty() && members_len + 2 + para.char_len > cfg.target_chunk_size {
            boundary = true;
        } else if cfg.detect_topic_boundary && members_len >= cfg.min_chunk_size && i > 0 {
            let prev = &paragraphs[i - 1];
            let drifted =
                rules::jaccard(&prev.keywords, &para.keywords) < cfg.topic_change_threshold;
            if drifted || rules::opens_topic_change(&para.text) {
                boundary = true;
            }
        }

        if boundary {
            flush(&mut members, &mut groups);
            members_len = 0;
        }

        members_len += para.char_len + if members.is_empty() { 0 } else { 2 };
        members.push(para);
    }
    flush(&mut members, &mut groups);

    groups
}

fn group_kind(members: &[&Paragraph]) -> ChunkKind {
    if members.iter().all(|p| p.heading) {
        ChunkKind::Heading
    } else if members.iter().any(|p| p.table) {
        ChunkKind::Table
    } else if members.iter().any(|p| p.list) {
        ChunkKind::List
    } else {
        ChunkKind::Content
    }
}

// ── Accumulation & emission ──────────────────────────────────────────

/// Accumulate groups into a pending buffer and emit chunks once the buffer
/// reaches the target size. The final remainder merges into the previous
/// chunk when it is too short and the merge stays within bounds; content is
/// never dropped.
fn accumulate(groups: &[Group], cfg: &ChunkingConfig) -> Vec<SemanticChunk> {
    let mut chunks: Vec<SemanticChunk> = Vec::new();
    let mut pending: Vec<&Group> = Vec::new();
    let mut pending_len = 0usize;

    for group in groups {
        pending_len += group.char_len + if pending.is_empty() { 0 } else { 2 };
        pending.push(group);

        if pending_len >= cfg.target_chunk_size {
            emit_pending(&pending, cfg, &mut chunks);
            pending.clear();
            pending_len = 0;
        }
    }

    if !pending.is_empty() {
        let tail_short = pending_len < cfg.min_chunk_size;
        let merged = tail_short
            && chunks.last().is_some_and(|last| {
                last.content.chars().count() + 2 + pending_len <= cfg.max_chunk_size
            });

        if merged {
            let tail_text = join_groups(&pending);
            let last = chunks.last_mut().expect("checked above");
            last.content.push_str("\n\n");
            last.content.push_str(&tail_text);
        } else {
            // Short remainder with nowhere to go is still emitted
            emit_pending(&pending, cfg, &mut chunks);
        }
    }

    chunks
}

fn join_groups(groups: &[&Group]) -> String {
    groups
        .iter()
        .map(|g| g.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn emit_pending(pending: &[&Group], cfg: &ChunkingConfig, chunks: &mut Vec<SemanticChunk>) {
    let content = join_groups(pending);
    let kind = pending
        .iter()
        .map(|g| g.kind)
        .reduce(merge_kinds)
        .unwrap_or(ChunkKind::Content);
    let section = pending[0].section.clone();

    let parts = if content.chars().count() > cfg.max_chunk_size {
        split_oversized(&content, cfg)
    } else {
        vec![content]
    };

    for part in parts {
        chunks.push(SemanticChunk {
            content: part,
            index: chunks.len(),
            kind,
            section_title: section.clone(),
            context_prefix: String::new(),
        });
    }
}

fn merge_kinds(a: ChunkKind, b: ChunkKind) -> ChunkKind {
    match (a, b) {
        (ChunkKind::Table, _) | (_, ChunkKind::Table) => ChunkKind::Table,
        (ChunkKind::List, _) | (_, ChunkKind::List) => ChunkKind::List,
        (ChunkKind::Heading, ChunkKind::Heading) => ChunkKind::Heading,
        _ => ChunkKind::Content,
    }
}

/// Split an oversized buffer at sentence boundaries into sub-chunks of at
/// most `target_chunk_size`. A trailing sub-chunk below the minimum is
/// folded into its predecessor when the merge stays within `max_chunk_size`,
/// so no content is lost.
fn split_oversized(content: &str, cfg: &ChunkingConfig) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(content) {
        let mut sentence_len = sentence.chars().count();
        let mut sentence = sentence;

        // A single sentence longer than the target is hard-split
        while sentence_len > cfg.target_chunk_size {
            if current_len > 0 {
                parts.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let cut: String = sentence.chars().take(cfg.target_chunk_size).collect();
            parts.push(cut);
            sentence = sentence.chars().skip(cfg.target_chunk_size).collect();
            sentence_len = sentence.chars().count();
        }
        if sentence.is_empty() {
            continue;
        }

        if current_len > 0 && current_len + 1 + sentence_len > cfg.target_chunk_size {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(&sentence);
        current_len += sentence_len;
    }
    if !current.is_empty() {
        parts.push(current);
    }

    // Fold any too-short part into a neighbor rather than dropping it. A
    // short part can also appear mid-sequence, when the buffer is flushed
    // because the following sentence alone exceeds the target.
    let mut i = 0;
    while i < parts.len() {
        let len = parts[i].chars().count();
        if parts.len() < 2 || len >= cfg.min_chunk_size {
            i += 1;
            continue;
        }

        let prev_fits =
            i > 0 && parts[i - 1].chars().count() + 1 + len <= cfg.max_chunk_size;
        let next_fits = i + 1 < parts.len()
            && len + 1 + parts[i + 1].chars().count() <= cfg.max_chunk_size;

        if prev_fits {
            let part = parts.remove(i);
            let prev = &mut parts[i - 1];
            prev.push(' ');
            prev.push_str(&part);
        } else if next_fits {
            let part = parts.remove(i);
            let next = &mut parts[i];
            next.insert(0, ' ');
            next.insert_str(0, &part);
        } else {
            i += 1;
        }
    }

    parts
}

// ── Sentences ────────────────────────────────────────────────────────

/// Split text into sentences at the fixed punctuation set. The terminator
/// stays attached to its sentence; a tail without one is its own sentence.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if rules::SENTENCE_TERMINATORS.contains(&c) {
            let at_boundary = chars.peek().is_none_or(|n| n.is_whitespace());
            let continues = chars
                .peek()
                .is_some_and(|n| rules::SENTENCE_TERMINATORS.contains(n));
            if at_boundary && !continues {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

fn apply_context_prefixes(chunks: &mut [SemanticChunk], overlap_sentences: usize) {
    if overlap_sentences == 0 {
        return;
    }
    for i in 1..chunks.len() {
        let prev_sentences = split_sentences(&chunks[i - 1].content);
        let start = prev_sentences.len().saturating_sub(overlap_sentences);
        chunks[i].context_prefix = prev_sentences[start..].join(" ");
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> ChunkingConfig {
        ChunkingConfig {
            target_chunk_size: 120,
            max_chunk_size: 240,
            min_chunk_size: 30,
            overlap_sentences: 2,
            detect_headings: true,
            detect_topic_boundary: true,
            topic_change_threshold: 0.3,
        }
    }

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk("", &ChunkingConfig::default()).is_empty());
        assert!(chunk("   \n\n   \n", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_short_document_single_chunk() {
        // Shorter than min_chunk_size but still emitted as one chunk
        let chunks = chunk("Tiny note.", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Tiny note.");
        assert_eq!(chunks[0].index, 0);
        assert!(chunks[0].context_prefix.is_empty());
    }

    #[test]
    fn test_heading_sets_section_title() {
        let text = "# Introduction\n\nThis document describes the retrieval engine design.\n\nThe engine stores chunk embeddings in a local database.";
        let chunks = chunk(text, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_title.as_deref(), Some("Introduction"));
    }

    #[test]
    fn test_section_title_follows_headings() {
        let para = "Sentence one about storage layout. Sentence two about storage layout. ".repeat(2);
        let text = format!("# First\n\n{para}\n\n# Second\n\n{para}");
        let chunks = chunk(&text, &small_cfg());
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].section_title.as_deref(), Some("First"));
        assert_eq!(
            chunks.last().unwrap().section_title.as_deref(),
            Some("Second")
        );
    }

    #[test]
    fn test_reassembly_preserves_content() {
        let text = "# Overview\n\nThe quick brown fox jumps over the lazy dog. \
                    Pack my box with five dozen liquor jugs. How vexingly quick daft zebras jump!\n\n\
                    Sphinx of black quartz, judge my vow. The five boxing wizards jump quickly. \
                    Jackdaws love my big sphinx of quartz.\n\n\
                    However, a completely different topic now begins here. Cooking pasta requires \
                    salted boiling water and patience. Always taste before serving.\n\n\
                    - first step of the recipe\n- second step of the recipe\n- third step of the recipe";
        let chunks = chunk(text, &small_cfg());
        assert!(!chunks.is_empty());

        let reassembled = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(normalize(&reassembled), normalize(text));
    }

    #[test]
    fn test_chunk_size_bounds() {
        let sentence = "Every chunk must respect the configured size envelope. ";
        let text = sentence.repeat(40);
        let cfg = small_cfg();
        let chunks = chunk(&text, &cfg);
        assert!(chunks.len() > 1);
        for c in &chunks {
            let len = c.content.chars().count();
            assert!(
                len >= cfg.min_chunk_size && len <= cfg.max_chunk_size,
                "chunk length {len} outside [{}, {}]",
                cfg.min_chunk_size,
                cfg.max_chunk_size
            );
        }
    }

    #[test]
    fn test_context_prefix_is_previous_tail() {
        let sentence = "Alpha beta gamma delta epsilon zeta eta theta iota kappa. ";
        let text = sentence.repeat(20);
        let cfg = small_cfg();
        let chunks = chunk(&text, &cfg);
        assert!(chunks.len() > 1);

        assert!(chunks[0].context_prefix.is_empty());
        for i in 1..chunks.len() {
            let prev_sentences = split_sentences(&chunks[i - 1].content);
            let start = prev_sentences.len().saturating_sub(cfg.overlap_sentences);
            let expected = prev_sentences[start..].join(" ");
            assert_eq!(chunks[i].context_prefix, expected);
        }
    }

    #[test]
    fn test_list_paragraph_kind() {
        let text = "- apples and oranges for the salad\n- pears and grapes for the dessert\n- plums and cherries for the jam";
        let chunks = chunk(text, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::List);
    }

    #[test]
    fn test_table_paragraph_kind() {
        let text = "| name | role |\n|------|------|\n| ada  | eng  |\n| lin  | ops  |";
        let chunks = chunk(text, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Table);
    }

    #[test]
    fn test_oversized_paragraph_splits_at_sentences() {
        // One paragraph far over max_chunk_size must split into bounded parts
        let text = "A reasonably sized sentence that keeps going for a while. ".repeat(12);
        let cfg = small_cfg();
        let chunks = chunk(&text, &cfg);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.chars().count() <= cfg.max_chunk_size);
        }
        // Sentence boundaries respected: each part ends with a terminator
        for c in &chunks {
            assert!(c.content.trim_end().ends_with('.'));
        }
    }

    #[test]
    fn test_tiny_sentence_before_giant_sentence_stays_in_bounds() {
        // The tiny opening sentence is flushed on its own when the next
        // sentence alone exceeds the target; it must be folded into a
        // neighboring part instead of surviving below the minimum
        let text = format!("Tiny. {}", "word ".repeat(200));
        let cfg = small_cfg();
        let chunks = chunk(&text, &cfg);
        assert!(chunks.len() > 1);

        assert!(chunks[0].content.starts_with("Tiny."));
        for c in &chunks {
            let len = c.content.chars().count();
            assert!(
                len >= cfg.min_chunk_size && len <= cfg.max_chunk_size,
                "chunk length {len} outside [{}, {}]",
                cfg.min_chunk_size,
                cfg.max_chunk_size
            );
        }
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("One. Two! Three? Four");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn test_split_sentences_ellipsis() {
        let s = split_sentences("Wait... done. Next");
        assert_eq!(s, vec!["Wait...", "done.", "Next"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "# Title\n\nSome content here about chunking. More content follows in the same paragraph.\n\nAnother paragraph entirely.";
        let cfg = ChunkingConfig::default();
        let a = chunk(text, &cfg);
        let b = chunk(text, &cfg);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.content, y.content);
            assert_eq!(x.section_title, y.section_title);
        }
    }
}
