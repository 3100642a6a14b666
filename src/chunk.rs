//! Separator-boundary text chunker with overlap.
//!
//! Splits the extracted document text into [`Chunk`]s of at most
//! `chunk_size` characters. Splitting happens on the configured separator
//! (a newline by default); the resulting pieces are greedily merged back
//! together, and each new chunk starts with trailing pieces of the previous
//! one totalling at most `chunk_overlap` characters.
//!
//! A piece with no separator that is longer than `chunk_size` is cut into
//! fixed windows of `chunk_size` characters stepping by
//! `chunk_size - chunk_overlap`.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text is never
//! cut inside a code point.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Splits text into overlapping segments.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`, and a zero size is
    /// treated as 1.
    pub fn new(chunk_size: usize, chunk_overlap: usize, separator: impl Into<String>) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separator: separator.into(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            config.separator.clone(),
        )
    }

    /// Splits `text` into chunk strings, in document order.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let pieces: Vec<&str> = if self.separator.is_empty() {
            vec![text]
        } else {
            text.split(self.separator.as_str()).collect()
        };

        let mut splits: Vec<String> = Vec::new();
        for piece in pieces.into_iter().filter(|p| !p.is_empty()) {
            if char_len(piece) > self.chunk_size {
                splits.extend(self.hard_split(piece));
            } else {
                splits.push(piece.to_string());
            }
        }

        self.merge_splits(&splits)
    }

    /// Cuts an oversized piece into windows of `chunk_size` characters.
    fn hard_split(&self, piece: &str) -> Vec<String> {
        let chars: Vec<char> = piece.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut out = Vec::new();
        let mut start = 0usize;

        while start < chars.len() {
            let end = usize::min(start + self.chunk_size, chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        out
    }

    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let sep_len = char_len(&self.separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joined_len = |total: usize, current: &VecDeque<&str>| {
                total + len + if current.is_empty() { 0 } else { sep_len }
            };

            if joined_len(total, &current) > self.chunk_size && !current.is_empty() {
                if let Some(chunk) = self.join(&current) {
                    chunks.push(chunk);
                }
                // Keep a tail of pieces as overlap for the next chunk
                while total > self.chunk_overlap
                    || (total > 0 && joined_len(total, &current) > self.chunk_size)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if current.is_empty() { 0 } else { sep_len };
            current.push_back(split);
        }

        if let Some(chunk) = self.join(&current) {
            chunks.push(chunk);
        }

        chunks
    }

    fn join(&self, pieces: &VecDeque<&str>) -> Option<String> {
        let joined = pieces
            .iter()
            .copied()
            .collect::<Vec<_>>()
            .join(&self.separator);
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits text into chunks per `config`.
/// Returns chunks with contiguous indices starting at 0; empty text yields none.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    TextSplitter::from_config(config)
        .split_text(text)
        .into_iter()
        .enumerate()
        .map(|(i, t)| make_chunk(i as i64, t))
        .collect()
}

fn make_chunk(index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk { index, text, hash }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> TextSplitter {
        TextSplitter::new(1000, 200, "\n")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello world", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello world");
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
        assert!(chunk_text("\n\n  \n", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_lines_merge_until_limit() {
        let s = TextSplitter::new(20, 5, "\n");
        let chunks = s.split_text("aaaa\nbbbb\ncccc\ndddd\neeee\nffff");
        // "aaaa\nbbbb\ncccc\ndddd" is 19 chars
        assert_eq!(chunks[0], "aaaa\nbbbb\ncccc\ndddd");
        assert_eq!(chunks[1], "dddd\neeee\nffff");
    }

    #[test]
    fn test_chunks_never_exceed_size() {
        let text = (0..400)
            .map(|i| format!("Line number {} with some filler text.", i))
            .collect::<Vec<_>>()
            .join("\n");
        for chunk in splitter().split_text(&text) {
            assert!(chunk.chars().count() <= 1000, "len {}", chunk.len());
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..300)
            .map(|i| format!("sentence {:03} of the document", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = splitter().split_text(&text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let next_first_line = pair[1].lines().next().unwrap();
            assert!(
                pair[0].ends_with(next_first_line) || pair[0].contains(next_first_line),
                "chunk does not carry over into the next one"
            );
            let carried: usize = pair[1]
                .lines()
                .take_while(|l| pair[0].contains(l))
                .map(|l| l.chars().count() + 1)
                .sum();
            assert!(carried <= 200 + 1);
        }
    }

    #[test]
    fn test_no_separator_falls_back_to_length_cut() {
        let text = "x".repeat(2500);
        let chunks = splitter().split_text(&text);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
        }
        assert_eq!(chunks[0].chars().count(), 1000);
    }

    #[test]
    fn test_multibyte_text_is_counted_in_chars() {
        let text = "é".repeat(1500);
        let chunks = splitter().split_text(&text);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..200)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
            separator: "\n".to_string(),
        };
        let chunks = chunk_text(&text, &config);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\nBeta\nGamma\nDelta";
        let config = ChunkingConfig {
            chunk_size: 12,
            chunk_overlap: 5,
            separator: "\n".to_string(),
        };
        let c1 = chunk_text(text, &config);
        let c2 = chunk_text(text, &config);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_overlap_clamped_below_size() {
        let s = TextSplitter::new(10, 50, "\n");
        let chunks = s.split_text(&"y".repeat(35));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }
}
