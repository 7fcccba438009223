use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const PRODUCT_COLUMN: &str = "Product";
pub const NARRATIVE_COLUMN: &str = "Consumer complaint narrative";
pub const COMPLAINT_ID_COLUMN: &str = "Complaint ID";
pub const CLEANED_NARRATIVE_COLUMN: &str = "Cleaned Narrative";

pub const TARGET_PRODUCTS: [&str; 5] = [
    "Credit card",
    "Personal loan",
    "Buy Now, Pay Later (BNPL)",
    "Savings account",
    "Money transfers",
];

pub const DEFAULT_TOP_K: usize = 5;

pub const DEFAULT_RAW_CSV: &str = "data/raw/complaints.csv";
pub const DEFAULT_INTERIM_CSV: &str = "data/interim/filtered_complaints.csv";
pub const DEFAULT_INDEX_DIR: &str = "vector_store/faiss_index";

/// Borrowed view of one raw input row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplaintRecord<'a> {
    pub product: &'a str,
    pub narrative: Option<&'a str>,
}

impl ComplaintRecord<'_> {
    pub fn has_narrative(&self) -> bool {
        self.narrative.is_some_and(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub complaint_id: String,
    pub product: String,
    pub cleaned_narrative: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub complaint_id: String,
    pub product: String,
    pub original_narrative: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: TextChunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Base URL and credentials of an OpenAI-compatible model server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl EndpointConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends `path` to the base URL, keeping any base path such as `/v1`.
    pub fn url_for(&self, path: &str) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&format!(
            "{}/{}",
            self.endpoint.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}
