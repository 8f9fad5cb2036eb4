//! Highlighted excerpts for search results.
//!
//! Every hit position opens a window of `border` words on each side. Windows
//! are merged in ascending start order (a window whose start is not past the
//! running window's end extends it), so the rendered fragments never overlap.

use std::collections::HashSet;

use crate::lemmatizer::Lemmatizer;

const ELLIPSIS: &str = "...";
const WINDOW_SEPARATOR: &str = "&emsp;&emsp;";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
    /// False when no query word was found and the text is the plain fallback.
    pub highlighted: bool,
}

/// Inclusive token range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

/// Builds the snippet of `text` for the given query lemmas.
pub fn snippet_for(
    lemmatizer: &Lemmatizer,
    text: &str,
    query_lemmas: &HashSet<String>,
    border: usize,
) -> Snippet {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let lemmas = lemmatizer.lemmatize_sequence(&tokens);
    let hits: Vec<usize> = lemmas
        .iter()
        .enumerate()
        .filter(|(_, lemma)| !lemma.is_empty() && query_lemmas.contains(*lemma))
        .map(|(i, _)| i)
        .collect();
    build_snippet(&tokens, &hits, border)
}

/// Merged windows around `hits` (ascending, deduplicated positions expected
/// but not required), clipped to `0..token_count`.
pub fn windows(hits: &[usize], border: usize, token_count: usize) -> Vec<Window> {
    if token_count == 0 {
        return Vec::new();
    }
    let mut positions: Vec<usize> = hits.iter().copied().filter(|&p| p < token_count).collect();
    positions.sort_unstable();
    positions.dedup();

    let mut merged: Vec<Window> = Vec::new();
    for pos in positions {
        let start = pos.saturating_sub(border);
        let end = (pos + border).min(token_count - 1);
        match merged.last_mut() {
            Some(current) if start <= current.end => current.end = current.end.max(end),
            _ => merged.push(Window { start, end }),
        }
    }
    merged
}

pub fn build_snippet(tokens: &[&str], hits: &[usize], border: usize) -> Snippet {
    if tokens.is_empty() {
        return Snippet {
            text: String::new(),
            highlighted: false,
        };
    }
    let found = windows(hits, border, tokens.len());
    let highlighted = !found.is_empty();
    let found = if highlighted {
        found
    } else {
        vec![Window {
            start: 0,
            end: tokens.len() - 1,
        }]
    };

    let hit_set: HashSet<usize> = hits.iter().copied().collect();
    let text = found
        .iter()
        .map(|w| render_window(tokens, &hit_set, *w))
        .collect::<Vec<_>>()
        .join(WINDOW_SEPARATOR);
    Snippet { text, highlighted }
}

fn render_window(tokens: &[&str], hits: &HashSet<usize>, window: Window) -> String {
    let words: Vec<String> = (window.start..=window.end)
        .map(|i| {
            if hits.contains(&i) {
                format!("<b>{}</b>", tokens[i])
            } else {
                tokens[i].to_string()
            }
        })
        .collect();
    format!("{} {} {}", ELLIPSIS, words.join(" "), ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{}", i)).collect()
    }

    #[test]
    fn test_single_hit_window() {
        let owned = words(10);
        let tokens: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
        let s = build_snippet(&tokens, &[5], 2);
        assert!(s.highlighted);
        assert_eq!(s.text, "... w3 w4 <b>w5</b> w6 w7 ...");
    }

    #[test]
    fn test_windows_clipped_at_edges() {
        assert_eq!(windows(&[0], 3, 10), vec![Window { start: 0, end: 3 }]);
        assert_eq!(windows(&[9], 3, 10), vec![Window { start: 6, end: 9 }]);
    }

    #[test]
    fn test_overlapping_windows_merge() {
        assert_eq!(windows(&[2, 5], 2, 20), vec![Window { start: 0, end: 7 }]);
        // start 4 <= running end 4: merged
        assert_eq!(windows(&[2, 6], 2, 20), vec![Window { start: 0, end: 8 }]);
        // start 5 > running end 4: separate
        assert_eq!(
            windows(&[2, 7], 2, 20),
            vec![Window { start: 0, end: 4 }, Window { start: 5, end: 9 }]
        );
    }

    #[test]
    fn test_unsorted_hits_are_ordered() {
        assert_eq!(
            windows(&[15, 1, 15], 1, 20),
            vec![Window { start: 0, end: 2 }, Window { start: 14, end: 16 }]
        );
    }

    #[test]
    fn test_windows_are_disjoint_and_cover_hits() {
        let hits = [1, 3, 9, 10, 22, 40, 41, 44];
        let ws = windows(&hits, 2, 45);
        for pair in ws.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
        for h in hits {
            assert_eq!(ws.iter().filter(|w| w.start <= h && h <= w.end).count(), 1);
        }
    }

    #[test]
    fn test_multiple_windows_separated() {
        let owned = words(20);
        let tokens: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
        let s = build_snippet(&tokens, &[1, 15], 1);
        assert_eq!(
            s.text,
            "... w0 <b>w1</b> w2 ...&emsp;&emsp;... w14 <b>w15</b> w16 ..."
        );
    }

    #[test]
    fn test_no_hits_falls_back_to_full_text() {
        let s = build_snippet(&["один", "два"], &[], 3);
        assert!(!s.highlighted);
        assert_eq!(s.text, "... один два ...");
    }

    #[test]
    fn test_empty_text() {
        let s = build_snippet(&[], &[], 3);
        assert_eq!(s.text, "");
        assert!(!s.highlighted);
    }
}
