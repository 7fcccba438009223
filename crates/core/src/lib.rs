pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod prompt;
pub mod session;
pub mod store;

pub use chunking::{
    build_chunks, chunk_table, split_text, ChunkingConfig, DEFAULT_CHUNK_CHARS,
    DEFAULT_CHUNK_OVERLAP,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL, MINILM_DIMENSIONS,
};
pub use error::{IndexError, ModelError, PreprocessError, QueryError};
pub use generation::{
    GenerationOptions, Generator, HttpGenerator, DEFAULT_GENERATION_MODEL, DEFAULT_MAX_NEW_TOKENS,
    DEFAULT_TEMPERATURE,
};
pub use indexer::{
    build_store, embed_and_store, embed_and_store_with_metric, index_cleaned_file, load_index,
    IndexHandle,
};
pub use models::{
    Answer, ChunkMetadata, CleanedRecord, ComplaintRecord, EndpointConfig, IndexEntry,
    RetrievedChunk, TextChunk, DEFAULT_INDEX_DIR, DEFAULT_INTERIM_CSV, DEFAULT_RAW_CSV,
    DEFAULT_TOP_K, TARGET_PRODUCTS,
};
pub use pipeline::{answer, QueryPipeline};
pub use preprocess::{
    clean_narratives, clean_text, filter_complaints, load_complaints, preprocess_file, save_table,
    ComplaintTable, PreprocessReport, TextCleaner,
};
pub use prompt::{build_prompt, PROMPT_TEMPLATE};
pub use session::{format_sources, ChatSession, ChatTurn, SOURCE_EXCERPT_CHARS};
pub use store::{DistanceMetric, IndexManifest, VectorStore};
