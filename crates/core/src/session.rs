use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::generation::Generator;
use crate::models::RetrievedChunk;
use crate::pipeline::QueryPipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub const SOURCE_EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub asked_at: DateTime<Utc>,
}

/// In-memory exchange history for one interactive session.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    turns: Vec<ChatTurn>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// A failed question leaves the history untouched.
    pub fn ask<E, G>(
        &mut self,
        pipeline: &QueryPipeline<'_, E, G>,
        question: &str,
    ) -> Result<&ChatTurn, QueryError>
    where
        E: Embedder,
        G: Generator,
    {
        let asked_at = Utc::now();
        let answer = pipeline.ask(question)?;

        self.turns.push(ChatTurn {
            question: question.to_string(),
            answer: answer.answer,
            sources: answer.sources,
            asked_at,
        });
        info!(session = %self.id, turns = self.turns.len(), "recorded chat turn");

        let position = self.turns.len() - 1;
        Ok(&self.turns[position])
    }

    pub fn clear(&mut self) {
        info!(session = %self.id, dropped = self.turns.len(), "cleared chat history");
        self.turns.clear();
    }
}

/// Numbered `[i] excerpt...` lines, one per source.
pub fn format_sources(sources: &[RetrievedChunk], max_chars: usize) -> Vec<String> {
    sources
        .iter()
        .enumerate()
        .map(|(position, source)| {
            let excerpt = source.chunk.text.chars().take(max_chars).collect::<String>();
            format!("[{}] {}...", position + 1, excerpt)
        })
        .collect()
}
