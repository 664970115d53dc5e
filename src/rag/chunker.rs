//! Word-count document chunking.
//!
//! Documents are split into consecutive groups of whitespace-delimited words
//! with no overlap; each chunk is the unit of embedding and retrieval. Word
//! order is preserved and the last chunk may be shorter than `chunk_size`.

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Split `text` into chunks of at most `chunk_size` words.
///
/// Empty or whitespace-only input yields no chunks. Runs of whitespace
/// collapse to a single separator in the output, so re-joining chunks
/// reproduces the word sequence, not the original byte layout.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    debug_assert!(chunk_size > 0);

    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(chunk_size.max(1))
        .map(|group| group.join(" "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", 500).is_empty());
        assert!(chunk_text("   \n\t  ", 500).is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 500);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn chunks_cover_all_words_in_order() {
        let text = (0..1234).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, 100);

        let rejoined = chunks.join(" ");
        let original: Vec<&str> = text.split_whitespace().collect();
        let recovered: Vec<&str> = rejoined.split_whitespace().collect();
        assert_eq!(original, recovered);
    }

    #[test]
    fn all_chunks_but_last_are_full() {
        let text = "w ".repeat(1050);
        let chunks = chunk_text(&text, 500);

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.split_whitespace().count(), 500);
        }
        assert_eq!(chunks[2].split_whitespace().count(), 50);
    }

    #[test]
    fn thousand_words_at_size_500_makes_two_chunks() {
        let text = "lorem ".repeat(1000);
        let chunks = chunk_text(&text, 500);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].split_whitespace().count(), 500);
        assert_eq!(chunks[1].split_whitespace().count(), 500);
    }

    #[test]
    fn mixed_whitespace_is_normalized() {
        let chunks = chunk_text("a\tb\n\nc   d", 2);
        assert_eq!(chunks, vec!["a b".to_string(), "c d".to_string()]);
    }
}
