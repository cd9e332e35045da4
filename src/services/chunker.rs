//! Token-window chunking.
//!
//! Text is split on whitespace and words are packed greedily until the next
//! one would overflow the model window. When a chunk is cut, a sentence end
//! near the tail is preferred as the boundary. Every chunk is re-counted with
//! the tokenizer before it is emitted.

use std::sync::Arc;

use tracing::warn;

use crate::error::ChunkError;

/// Tokenizer view used for length accounting.
pub trait TokenCounter: Send + Sync {
    /// Byte ranges of the tokens of `text`, special tokens excluded.
    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>, ChunkError>;

    /// Number of tokens the model sees for `text`, special tokens included.
    fn count_tokens(&self, text: &str) -> Result<usize, ChunkError>;
}

/// Splits text into chunks that each fit the embedding model's token window.
///
/// A single token that alone exceeds the window cannot be split further and
/// is emitted as its own oversized chunk (logged at warn level).
#[derive(Clone)]
pub struct TokenChunker {
    counter: Arc<dyn TokenCounter>,
    max_tokens: usize,
    reserved: usize,
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("max_tokens", &self.max_tokens)
            .field("reserved", &self.reserved)
            .finish()
    }
}

impl TokenChunker {
    /// Create a chunker for a window of `max_tokens`, special tokens included.
    pub fn new(counter: Arc<dyn TokenCounter>, max_tokens: usize) -> Result<Self, ChunkError> {
        let reserved = counter.count_tokens("")?;
        if max_tokens <= reserved {
            return Err(ChunkError::WindowTooSmall {
                max_tokens,
                reserved,
            });
        }
        Ok(Self {
            counter,
            max_tokens,
            reserved,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Tokens available for content once special tokens are accounted for.
    pub fn budget(&self) -> usize {
        self.max_tokens - self.reserved
    }

    pub fn count_tokens(&self, text: &str) -> Result<usize, ChunkError> {
        self.counter.count_tokens(text)
    }

    /// Chunk each segment independently and concatenate the results in order.
    pub fn chunk_segments(&self, segments: &[String]) -> Result<Vec<String>, ChunkError> {
        let mut chunks = Vec::new();
        for segment in segments {
            chunks.extend(self.chunk(segment)?);
        }
        Ok(chunks)
    }

    /// Chunk one piece of text. Blank text yields no chunks.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>, ChunkError> {
        let budget = self.budget();
        let mut packed: Vec<String> = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut current_tokens = 0usize;

        for word in text.split_whitespace() {
            let tokens = self.counter.token_spans(word)?.len();

            if tokens > budget {
                if !current.is_empty() {
                    packed.push(join_words(&current));
                    current.clear();
                    current_tokens = 0;
                }
                packed.extend(self.split_word(word, budget)?);
                continue;
            }

            if current_tokens + tokens > budget {
                let cut = sentence_cut(&current, tokens, budget);
                let tail = current.split_off(cut);
                packed.push(join_words(&current));
                current_tokens = tail.iter().map(|(_, n)| n).sum();
                current = tail;
            }

            current.push((word, tokens));
            current_tokens += tokens;
        }

        if !current.is_empty() {
            packed.push(join_words(&current));
        }

        let mut chunks = Vec::with_capacity(packed.len());
        for candidate in packed {
            self.fit(candidate, &mut chunks)?;
        }
        Ok(chunks)
    }

    /// Split a word longer than the budget at token boundaries.
    fn split_word(&self, word: &str, budget: usize) -> Result<Vec<String>, ChunkError> {
        let spans = self.counter.token_spans(word)?;
        let group_starts: Vec<(usize, usize)> =
            spans.chunks(budget).skip(1).map(|group| group[0]).collect();
        let cuts = inner_starts(word, &group_starts);

        let mut pieces = Vec::with_capacity(cuts.len() + 1);
        let mut from = 0;
        for cut in cuts.into_iter().chain(std::iter::once(word.len())) {
            pieces.push(word[from..cut].to_string());
            from = cut;
        }
        Ok(pieces)
    }

    /// Emit `candidate` if it fits the window, otherwise halve it and retry.
    fn fit(&self, candidate: String, out: &mut Vec<String>) -> Result<(), ChunkError> {
        if self.counter.count_tokens(&candidate)? <= self.max_tokens {
            out.push(candidate);
            return Ok(());
        }

        let words: Vec<&str> = candidate.split_whitespace().collect();
        if words.len() > 1 {
            let mid = words.len() / 2;
            self.fit(words[..mid].join(" "), out)?;
            return self.fit(words[mid..].join(" "), out);
        }

        let spans = self.counter.token_spans(&candidate)?;
        let cuts = inner_starts(&candidate, &spans);
        if let Some(&mid) = cuts.get(cuts.len() / 2) {
            let (head, tail) = candidate.split_at(mid);
            self.fit(head.to_string(), out)?;
            return self.fit(tail.to_string(), out);
        }

        warn!(
            max_tokens = self.max_tokens,
            chars = candidate.len(),
            "single token exceeds the model window, emitting oversized chunk"
        );
        out.push(candidate);
        Ok(())
    }
}

/// Index after which to cut `current` when `incoming` tokens do not fit.
///
/// Looks for a sentence end in the last fifth of the words; the words after
/// it move to the next chunk when they still fit together with the incoming word.
fn sentence_cut(current: &[(&str, usize)], incoming: usize, budget: usize) -> usize {
    let len = current.len();
    if len < 2 || ends_sentence(current[len - 1].0) {
        return len;
    }

    let lookback = (len / 5).max(1);
    let search_from = len.saturating_sub(lookback + 1);

    for i in (search_from..len - 1).rev() {
        if ends_sentence(current[i].0) {
            let tail_tokens: usize = current[i + 1..].iter().map(|(_, n)| n).sum();
            if tail_tokens + incoming <= budget {
                return i + 1;
            }
            break;
        }
    }
    len
}

fn ends_sentence(word: &str) -> bool {
    word.ends_with(['.', '!', '?'])
}

/// Token starts strictly inside `text`, sorted and deduplicated.
///
/// Tokenizers may report repeated or zero offsets; those are not usable cut points.
fn inner_starts(text: &str, spans: &[(usize, usize)]) -> Vec<usize> {
    let mut starts: Vec<usize> = spans
        .iter()
        .map(|(start, _)| *start)
        .filter(|&start| start > 0 && start < text.len() && text.is_char_boundary(start))
        .collect();
    starts.sort_unstable();
    starts.dedup();
    starts
}

fn join_words(words: &[(&str, usize)]) -> String {
    words
        .iter()
        .map(|(w, _)| *w)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    /// Words and punctuation marks are tokens; two special tokens wrap every input.
    struct PunctTokenizer {
        re: Regex,
    }

    impl PunctTokenizer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                re: Regex::new(r"\w+|[^\w\s]").unwrap(),
            })
        }
    }

    impl TokenCounter for PunctTokenizer {
        fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>, ChunkError> {
            Ok(self.re.find_iter(text).map(|m| (m.start(), m.end())).collect())
        }

        fn count_tokens(&self, text: &str) -> Result<usize, ChunkError> {
            Ok(self.token_spans(text)?.len() + 2)
        }
    }

    /// Every 4 bytes of a word are one token.
    struct ByteQuadTokenizer;

    impl TokenCounter for ByteQuadTokenizer {
        fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>, ChunkError> {
            let mut spans = Vec::new();
            let mut offset = 0;
            for word in text.split(' ') {
                let mut start = 0;
                while start < word.len() {
                    let end = (start + 4).min(word.len());
                    spans.push((offset + start, offset + end));
                    start = end;
                }
                offset += word.len() + 1;
            }
            Ok(spans)
        }

        fn count_tokens(&self, text: &str) -> Result<usize, ChunkError> {
            Ok(self.token_spans(text)?.len())
        }
    }

    /// Byte-fallback style: one token per byte, every span reported at offset 0.
    struct ZeroOffsetTokenizer;

    impl TokenCounter for ZeroOffsetTokenizer {
        fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>, ChunkError> {
            Ok(text.bytes().map(|_| (0, 0)).collect())
        }

        fn count_tokens(&self, text: &str) -> Result<usize, ChunkError> {
            Ok(text.len() + 1)
        }
    }

    fn tokens_of(tok: &PunctTokenizer, text: &str) -> Vec<String> {
        tok.re.find_iter(text).map(|m| m.as_str().to_string()).collect()
    }

    #[test]
    fn test_empty_text_no_chunks() {
        let chunker = TokenChunker::new(PunctTokenizer::new(), 50).unwrap();
        assert!(chunker.chunk("").unwrap().is_empty());
        assert!(chunker.chunk("   \t ").unwrap().is_empty());
        assert!(chunker.chunk_segments(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TokenChunker::new(PunctTokenizer::new(), 50).unwrap();
        let chunks = chunker.chunk("Hello, world!").unwrap();
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_window_bound_and_token_stream_preserved() {
        let tok = PunctTokenizer::new();
        let chunker = TokenChunker::new(tok.clone(), 50).unwrap();
        let text = "Hello world. ".repeat(500);

        let chunks = chunker.chunk(&text).unwrap();

        let total = tok.token_spans(&text).unwrap().len();
        assert!(chunks.len() >= total.div_ceil(50));
        for chunk in &chunks {
            assert!(tok.count_tokens(chunk).unwrap() <= 50, "chunk too long: {chunk}");
        }

        let rejoined = chunks.join(" ");
        assert_eq!(tokens_of(&tok, &rejoined), tokens_of(&tok, &text));
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let chunker = TokenChunker::new(PunctTokenizer::new(), 12).unwrap();
        // budget 10: "one two three four five six seven eight. nine" is 10 tokens
        let chunks = chunker
            .chunk("one two three four five six seven eight. nine ten eleven")
            .unwrap();
        assert_eq!(chunks[0], "one two three four five six seven eight.");
        assert_eq!(chunks[1], "nine ten eleven");
    }

    #[test]
    fn test_segments_chunked_independently() {
        let chunker = TokenChunker::new(PunctTokenizer::new(), 50).unwrap();
        let chunks = chunker
            .chunk_segments(&["first segment".to_string(), "second segment".to_string()])
            .unwrap();
        assert_eq!(chunks, vec!["first segment", "second segment"]);
    }

    #[test]
    fn test_long_word_split_at_token_boundaries() {
        let tok = Arc::new(ByteQuadTokenizer);
        let chunker = TokenChunker::new(tok.clone(), 3).unwrap();
        let word = "abcdefghijklmnopqrstuvwxyz";

        let chunks = chunker.chunk(&format!("pre {word} post")).unwrap();

        assert_eq!(chunks.first().map(String::as_str), Some("pre"));
        assert_eq!(chunks.last().map(String::as_str), Some("post"));
        let middle: String = chunks[1..chunks.len() - 1].concat();
        assert_eq!(middle, word);
        for chunk in &chunks {
            assert!(tok.count_tokens(chunk).unwrap() <= 3);
        }
    }

    #[test]
    fn test_unusable_offsets_emit_oversized_chunk() {
        let chunker = TokenChunker::new(Arc::new(ZeroOffsetTokenizer), 5).unwrap();

        let chunks = chunker.chunk("ab cdefghij").unwrap();
        assert_eq!(chunks, vec!["ab".to_string(), "cdefghij".to_string()]);
    }

    #[test]
    fn test_inner_starts_skips_edges_and_repeats() {
        assert_eq!(inner_starts("abcdef", &[(0, 2), (2, 4), (2, 3), (4, 6), (6, 6)]), vec![2, 4]);
        assert!(inner_starts("abc", &[(0, 0), (0, 0)]).is_empty());
        assert_eq!(inner_starts("h\u{e9}llo", &[(0, 1), (2, 3), (3, 6)]), vec![3]);
    }

    #[test]
    fn test_window_too_small() {
        let err = TokenChunker::new(PunctTokenizer::new(), 2).unwrap_err();
        assert!(matches!(
            err,
            ChunkError::WindowTooSmall {
                max_tokens: 2,
                reserved: 2
            }
        ));
    }

    #[test]
    fn test_budget() {
        let chunker = TokenChunker::new(PunctTokenizer::new(), 384).unwrap();
        assert_eq!(chunker.max_tokens(), 384);
        assert_eq!(chunker.budget(), 382);
    }
}
