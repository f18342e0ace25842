pub mod chunker;
pub mod contextualizer;
pub mod parser;

pub use chunker::{Chunk, TextChunker};
pub use contextualizer::{ContextualizationOutcome, ContextualizedChunk, Contextualizer};
pub use parser::{DocumentParser, ParsedDocument};
