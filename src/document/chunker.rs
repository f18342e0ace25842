use anyhow::{Context, Result};
use text_splitter::{ChunkConfig, TextSplitter};
use tiktoken_rs::cl100k_base;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub chunk_index: i32,
}

/// Token-bounded splitter used at ingest time (spec §4.2). Chunk boundaries
/// prefer sentence breaks within the configured window and a fixed-size
/// token overlap carries context across adjacent chunks.
pub struct TextChunker {
    splitter: TextSplitter<tiktoken_rs::CoreBPE>,
}

impl TextChunker {
    pub fn new(chunk_size_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        let tokenizer = cl100k_base().context("loading cl100k_base tokenizer")?;
        let config = ChunkConfig::new(chunk_size_tokens)
            .with_sizer(tokenizer)
            .with_overlap(overlap_tokens)
            .context("building chunk config")?;

        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        self.splitter
            .chunks(text)
            .enumerate()
            .map(|(index, content)| Chunk {
                content: content.to_string(),
                chunk_index: index as i32,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_short_text_as_single_chunk() {
        let chunker = TextChunker::new(800, 80).unwrap();
        let chunks = chunker.chunk("A short paragraph about nothing in particular.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn chunks_long_text_into_multiple_pieces() {
        let chunker = TextChunker::new(50, 10).unwrap();
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text = sentence.repeat(60);

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
            assert!(!chunk.content.trim().is_empty());
        }
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        let chunker = TextChunker::new(800, 80).unwrap();
        assert!(chunker.chunk("").is_empty());
    }
}
