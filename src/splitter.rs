//! Recursive character text splitting.
//!
//! Documents are cut into overlapping chunks before embedding. The splitter
//! walks a separator hierarchy (paragraph breaks, then line breaks, then
//! spaces, then raw characters) and greedily merges the resulting pieces
//! into chunks of at most `chunk_size` characters, carrying `chunk_overlap`
//! trailing characters of context into the next chunk. Lengths are measured
//! in characters, the same unit the price allocator uses.

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`; a zero `chunk_size` is
    /// lifted to one character.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Splits `text` into chunks of at most `chunk_size` characters.
    ///
    /// Whitespace-only pieces are dropped; the remaining chunk indices are
    /// dense starting at zero.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &DEFAULT_SEPARATORS)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        let (separator, rest) = match separators.split_first() {
            Some((sep, rest)) => (*sep, rest),
            None => return self.hard_split(text),
        };
        if separator.is_empty() {
            return self.hard_split(text);
        }
        if !text.contains(separator) {
            return self.split_recursive(text, rest);
        }

        // Keep the separator attached to the end of the piece it terminates,
        // so merged chunks reproduce the source text around their seams.
        let mut pieces: Vec<String> = Vec::new();
        let mut remainder = text;
        while let Some(at) = remainder.find(separator) {
            let end = at + separator.len();
            pieces.push(remainder[..end].to_string());
            remainder = &remainder[end..];
        }
        if !remainder.is_empty() {
            pieces.push(remainder.to_string());
        }

        // Oversized pieces descend to the next separator level before merging.
        let mut sized: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) > self.chunk_size {
                sized.extend(self.split_recursive(&piece, rest));
            } else {
                sized.push(piece);
            }
        }
        self.merge(sized)
    }

    /// Greedy merge of pieces into chunks, retaining up to `chunk_overlap`
    /// trailing characters of each emitted chunk as the seed of the next.
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            if total + len > self.chunk_size && total > 0 {
                chunks.push(current.concat());
                // Drop leading pieces until what remains fits in the overlap
                // budget and leaves room for the incoming piece.
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    let dropped = current.remove(0);
                    total -= char_len(&dropped);
                    if current.is_empty() {
                        break;
                    }
                }
            }
            total += len;
            current.push(piece);
        }
        if !current.is_empty() {
            chunks.push(current.concat());
        }
        chunks
    }

    /// Character-window split for text with no usable separator left.
    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 20);
        assert_eq!(splitter.split_text("hello world"), vec!["hello world"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = TextSplitter::new(100, 20);
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn splits_on_paragraphs_first() {
        let splitter = TextSplitter::new(20, 0);
        let text = "first paragraph\n\nsecond paragraph";
        let chunks = splitter.split_text(text);
        assert_eq!(chunks, vec!["first paragraph", "second paragraph"]);
    }

    #[test]
    fn every_chunk_respects_the_size_limit() {
        let splitter = TextSplitter::new(50, 10);
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
                    Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. \
                    Ut enim ad minim veniam, quis nostrud exercitation.";
        for chunk in splitter.split_text(text) {
            assert!(chunk.chars().count() <= 50, "oversized chunk: {chunk:?}");
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let splitter = TextSplitter::new(30, 12);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = splitter.split_text(text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0]
                .chars()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            assert!(
                pair[1].contains(prev_tail.trim()),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn unbroken_text_hard_splits() {
        let splitter = TextSplitter::new(10, 2);
        let text = "a".repeat(25);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        let reconstructed: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(reconstructed >= 25);
    }

    #[test]
    fn multibyte_text_counts_characters_not_bytes() {
        let splitter = TextSplitter::new(10, 0);
        let text = "ab ".repeat(4) + &"é".repeat(12);
        let chunks = splitter.split_text(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }
}
