use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::generation::Generator;
use crate::indexer::IndexHandle;
use crate::models::{Answer, DEFAULT_TOP_K};
use crate::prompt::build_prompt;
use tracing::{debug, info};

/// Retrieve, build the prompt, generate. Nothing is cached between calls.
pub fn answer<E, G>(
    question: &str,
    index: &IndexHandle<E>,
    generator: &G,
    top_k: usize,
) -> Result<Answer, QueryError>
where
    E: Embedder,
    G: Generator + ?Sized,
{
    if question.trim().is_empty() {
        return Err(QueryError::EmptyQuestion);
    }

    info!(top_k, "answering question");
    let sources = index.retrieve(question, top_k)?;
    debug!(retrieved = sources.len(), "retrieved context chunks");

    let prompt = build_prompt(&sources, question);
    let answer = generator.generate(&prompt)?;
    debug!(model = %generator.model_id(), answer_chars = answer.len(), "generated answer");

    Ok(Answer { answer, sources })
}

/// The process-wide index and the generation model, injected once and reused per question.
pub struct QueryPipeline<'a, E, G> {
    index: &'a IndexHandle<E>,
    generator: G,
    top_k: usize,
}

impl<'a, E, G> QueryPipeline<'a, E, G>
where
    E: Embedder,
    G: Generator,
{
    pub fn new(index: &'a IndexHandle<E>, generator: G) -> Self {
        Self {
            index,
            generator,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &IndexHandle<E> {
        self.index
    }

    pub fn ask(&self, question: &str) -> Result<Answer, QueryError> {
        self.ask_with_top_k(question, self.top_k)
    }

    pub fn ask_with_top_k(&self, question: &str, top_k: usize) -> Result<Answer, QueryError> {
        answer(question, self.index, &self.generator, top_k)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chunking::{chunk_table, ChunkingConfig};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::ModelError;
    use crate::indexer::{embed_and_store, load_index};
    use crate::models::{CLEANED_NARRATIVE_COLUMN, COMPLAINT_ID_COLUMN, PRODUCT_COLUMN};
    use crate::preprocess::ComplaintTable;
    use std::cell::RefCell;
    use tempfile::tempdir;

    /// Records every prompt and answers with a canned summary.
    #[derive(Default)]
    pub(crate) struct RecordingGenerator {
        pub(crate) prompts: RefCell<Vec<String>>,
    }

    impl Generator for RecordingGenerator {
        fn model_id(&self) -> &str {
            "recording"
        }

        fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok("Customers report unexpected fees.".to_string())
        }
    }

    pub(crate) struct FailingGenerator;

    impl Generator for FailingGenerator {
        fn model_id(&self) -> &str {
            "failing"
        }

        fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Err(ModelError::BackendResponse {
                backend: "generation".to_string(),
                details: "503 Service Unavailable".to_string(),
            })
        }
    }

    pub(crate) fn two_row_index(
        dir: &std::path::Path,
    ) -> Result<IndexHandle<CharacterNgramEmbedder>, Box<dyn std::error::Error>> {
        let table = ComplaintTable::new(
            vec![
                COMPLAINT_ID_COLUMN.to_string(),
                PRODUCT_COLUMN.to_string(),
                CLEANED_NARRATIVE_COLUMN.to_string(),
            ],
            vec![
                vec![
                    "1".to_string(),
                    "Credit card".to_string(),
                    "my credit card was charged a late fee twice.".to_string(),
                ],
                vec![
                    "2".to_string(),
                    "Money transfers".to_string(),
                    "the wire transfer to my sister never arrived.".to_string(),
                ],
            ],
        )?;

        let embedder = CharacterNgramEmbedder::default();
        let chunks = chunk_table(&table, &ChunkingConfig::default())?;
        embed_and_store(&chunks, &embedder, dir)?;
        Ok(load_index(dir, embedder)?)
    }

    #[test]
    fn answer_returns_generated_text_and_one_source() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = two_row_index(dir.path())?;
        let generator = RecordingGenerator::default();

        let result = answer("why was my credit card charged a fee?", &index, &generator, 1)?;
        assert_eq!(result.sources.len(), 1);
        assert!(!result.answer.is_empty());

        let prompts = generator.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(&result.sources[0].chunk.text));
        assert!(prompts[0].contains("Question:\nwhy was my credit card charged a fee?"));
        Ok(())
    }

    #[test]
    fn repeated_question_retrieves_the_same_source() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = two_row_index(dir.path())?;
        let generator = RecordingGenerator::default();
        let pipeline = QueryPipeline::new(&index, generator).with_top_k(1);

        let first = pipeline.ask("wire transfer never arrived")?;
        let second = pipeline.ask("wire transfer never arrived")?;
        assert_eq!(first.sources, second.sources);
        assert_eq!(first.sources[0].chunk.metadata.complaint_id, "2");
        Ok(())
    }

    #[test]
    fn every_question_calls_the_generator() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = two_row_index(dir.path())?;
        let generator = RecordingGenerator::default();

        answer("late fee", &index, &generator, 2)?;
        answer("late fee", &index, &generator, 2)?;
        assert_eq!(generator.prompts.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn blank_question_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = two_row_index(dir.path())?;
        let result = answer("   ", &index, &RecordingGenerator::default(), 1);
        assert!(matches!(result, Err(QueryError::EmptyQuestion)));
        Ok(())
    }

    #[test]
    fn generation_failure_propagates() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = two_row_index(dir.path())?;
        let result = answer("late fee", &index, &FailingGenerator, 1);
        assert!(matches!(
            result,
            Err(QueryError::Model(ModelError::BackendResponse { .. }))
        ));
        Ok(())
    }
}
