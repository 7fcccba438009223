use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("missing expected column: {0}")]
    MissingColumn(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding dimension {actual} does not match expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("table error: {0}")]
    Table(#[from] PreprocessError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("cannot build an index from zero chunks")]
    EmptyChunks,

    #[error("index was built with embedding model {stored}, but {supplied} was supplied")]
    ModelMismatch { stored: String, supplied: String },

    #[error("index stores {stored}-dimensional vectors, but the embedder produces {supplied}")]
    DimensionMismatch { stored: usize, supplied: usize },

    #[error("corrupt index: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("top_k must be a positive integer")]
    InvalidTopK,

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}
