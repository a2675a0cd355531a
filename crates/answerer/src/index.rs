//! In-memory reverse index over document passages.
//!
//! Maps lowercase words to passage positions with match counts.  Built once
//! per upload and never mutated afterwards, so a fresh upload always gets a
//! fresh index.

use std::collections::{HashMap, HashSet};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A chunk of document text and the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub source: String,
    pub text: String,
}

/// A scored search result.
#[derive(Debug, Clone)]
pub struct PassageHit<'a> {
    pub passage: &'a Passage,
    pub score: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PassageIndex
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PassageIndex {
    passages: Vec<Passage>,
    /// word -> { passage position -> count }
    index: HashMap<String, HashMap<usize, usize>>,
}

impl PassageIndex {
    pub fn build(passages: Vec<Passage>) -> Self {
        let mut index: HashMap<String, HashMap<usize, usize>> = HashMap::new();
        for (pos, passage) in passages.iter().enumerate() {
            for word in tokenize(&passage.text) {
                *index.entry(word).or_default().entry(pos).or_insert(0) += 1;
            }
        }
        Self { passages, index }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Rank passages by total occurrences of the query words (OR semantics).
    ///
    /// Ties keep document order.  Returns at most `limit` hits.
    pub fn search(&self, query: &str, limit: usize) -> Vec<PassageHit<'_>> {
        let mut seen = HashSet::new();
        let mut scores: HashMap<usize, usize> = HashMap::new();

        for word in tokenize(query) {
            if !seen.insert(word.clone()) {
                continue;
            }
            if let Some(matches) = self.index.get(&word) {
                for (pos, count) in matches {
                    *scores.entry(*pos).or_insert(0) += count;
                }
            }
        }

        let mut ranked: Vec<(usize, usize)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);

        ranked
            .into_iter()
            .map(|(pos, score)| PassageHit {
                passage: &self.passages[pos],
                score,
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tokenize text into lowercase alphanumeric words (minimum 2 characters).
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(String::from)
        .collect()
}

/// Split text into passages on blank lines.  Paragraph lines are joined
/// with single spaces; paragraphs over `max_chars` are cut on whitespace.
pub fn split_passages(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut paragraph = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            push_paragraph(&mut out, &paragraph, max_chars);
            paragraph.clear();
            continue;
        }
        if !paragraph.is_empty() {
            paragraph.push(' ');
        }
        paragraph.push_str(line);
    }
    push_paragraph(&mut out, &paragraph, max_chars);

    out
}

fn push_paragraph(out: &mut Vec<String>, paragraph: &str, max_chars: usize) {
    let mut rest = paragraph.trim();
    while rest.len() > max_chars {
        let mut end = max_chars;
        while !rest.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        // Prefer cutting at the last whitespace before the limit.
        let cut = rest[..end].rfind(char::is_whitespace).unwrap_or(end);
        let cut = if cut == 0 { end } else { cut };
        out.push(rest[..cut].trim_end().to_owned());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        out.push(rest.to_owned());
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
