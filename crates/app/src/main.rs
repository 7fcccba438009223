use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use complaint_rag_core::{
    format_sources, index_cleaned_file, load_index, preprocess_file, CharacterNgramEmbedder,
    ChatSession, ChunkingConfig, DistanceMetric, Embedder, EndpointConfig, GenerationOptions,
    HttpEmbedder, HttpGenerator, QueryPipeline, RetrievedChunk, DEFAULT_CHUNK_CHARS,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, DEFAULT_INDEX_DIR,
    DEFAULT_INTERIM_CSV, DEFAULT_MAX_NEW_TOKENS, DEFAULT_RAW_CSV, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_K, MINILM_DIMENSIONS, SOURCE_EXCERPT_CHARS, TARGET_PRODUCTS,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "complaint-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Raw complaints CSV
    #[arg(long, global = true, env = "RAW_CSV", default_value = DEFAULT_RAW_CSV)]
    raw_csv: PathBuf,

    /// Cleaned complaints CSV written by `preprocess` and read by `index`
    #[arg(long, global = true, env = "INTERIM_CSV", default_value = DEFAULT_INTERIM_CSV)]
    interim_csv: PathBuf,

    /// Directory holding the persisted vector index
    #[arg(long, global = true, env = "INDEX_DIR", default_value = DEFAULT_INDEX_DIR)]
    index_dir: PathBuf,

    /// OpenAI-compatible embeddings base URL; the offline trigram embedder is used when unset
    #[arg(long, global = true, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// Embedding model served at the embeddings endpoint
    #[arg(
        long,
        global = true,
        env = "EMBEDDING_MODEL",
        default_value = DEFAULT_EMBEDDING_MODEL
    )]
    embedding_model: String,

    /// Vector size produced by the embedding model
    #[arg(
        long,
        global = true,
        env = "EMBEDDING_DIMENSIONS",
        default_value_t = MINILM_DIMENSIONS
    )]
    embedding_dimensions: usize,

    /// Bearer token for the embeddings endpoint
    #[arg(long, global = true, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// OpenAI-compatible completions base URL, required by `ask` and `chat`
    #[arg(long, global = true, env = "GENERATION_ENDPOINT")]
    generation_endpoint: Option<String>,

    /// Text-generation model served at the completions endpoint
    #[arg(
        long,
        global = true,
        env = "GENERATION_MODEL",
        default_value = DEFAULT_GENERATION_MODEL
    )]
    generation_model: String,

    /// Bearer token for the completions endpoint
    #[arg(long, global = true, env = "GENERATION_API_KEY", hide_env_values = true)]
    generation_api_key: Option<String>,

    /// Maximum number of generated tokens
    #[arg(
        long,
        global = true,
        env = "MAX_NEW_TOKENS",
        default_value_t = DEFAULT_MAX_NEW_TOKENS
    )]
    max_new_tokens: u32,

    /// Sampling temperature for generation
    #[arg(long, global = true, env = "TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// HTTP timeout for model calls; no timeout when unset
    #[arg(long, global = true, env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Filter the raw complaints to the target products and clean their narratives.
    Preprocess,
    /// Chunk the cleaned narratives, embed every chunk and persist the index.
    Index {
        /// Maximum characters per chunk.
        #[arg(long, default_value_t = DEFAULT_CHUNK_CHARS)]
        chunk_size: usize,
        /// Characters shared between neighbouring chunks.
        #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
        chunk_overlap: usize,
        /// Distance metric stored with the index.
        #[arg(long, value_enum, default_value_t = Metric::L2)]
        metric: Metric,
    },
    /// Answer one question and print the sources used.
    Ask {
        /// Question about the complaints
        #[arg(long)]
        question: String,
        /// Number of chunks retrieved as context.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Interactive question/answer session; `:clear` resets history, `:quit` exits.
    Chat {
        /// Number of chunks retrieved as context.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    L2,
    Cosine,
}

impl From<Metric> for DistanceMetric {
    fn from(value: Metric) -> Self {
        match value {
            Metric::L2 => DistanceMetric::L2,
            Metric::Cosine => DistanceMetric::Cosine,
        }
    }
}

impl Cli {
    fn timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    fn embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        match &self.embedding_endpoint {
            Some(endpoint) => {
                let config = EndpointConfig::new(endpoint.as_str())
                    .with_api_key(self.embedding_api_key.clone())
                    .with_timeout(self.timeout());
                let embedder =
                    HttpEmbedder::new(&config, &self.embedding_model, self.embedding_dimensions)?;
                Ok(Box::new(embedder))
            }
            None => {
                warn!("no embedding endpoint configured, using the offline trigram embedder");
                Ok(Box::new(CharacterNgramEmbedder::default()))
            }
        }
    }

    fn generator(&self) -> anyhow::Result<HttpGenerator> {
        let endpoint = self
            .generation_endpoint
            .as_deref()
            .context("set --generation-endpoint or GENERATION_ENDPOINT to answer questions")?;
        let config = EndpointConfig::new(endpoint)
            .with_api_key(self.generation_api_key.clone())
            .with_timeout(self.timeout());
        let options = GenerationOptions {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
        };
        Ok(HttpGenerator::new(&config, &self.generation_model, options)?)
    }
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "complaint-rag boot"
    );

    match &cli.command {
        Command::Preprocess => {
            let report = preprocess_file(&cli.raw_csv, &cli.interim_csv, &TARGET_PRODUCTS)
                .with_context(|| format!("preprocessing {} failed", cli.raw_csv.display()))?;

            println!(
                "{} of {} complaints retained ({} had a narrative) -> {}",
                report.retained_rows,
                report.loaded_rows,
                report.with_narrative,
                cli.interim_csv.display()
            );
        }
        Command::Index {
            chunk_size,
            chunk_overlap,
            metric,
        } => {
            let config = ChunkingConfig {
                max_chars: *chunk_size,
                overlap_chars: *chunk_overlap,
                ..ChunkingConfig::default()
            };
            let embedder = cli.embedder()?;

            let manifest = index_cleaned_file(
                &cli.interim_csv,
                &cli.index_dir,
                &config,
                embedder.as_ref(),
                (*metric).into(),
            )
            .with_context(|| format!("indexing {} failed", cli.interim_csv.display()))?;

            println!(
                "{} chunks indexed with {} into {} at {}",
                manifest.entry_count,
                manifest.embedding_model,
                cli.index_dir.display(),
                manifest.built_at.to_rfc3339()
            );
        }
        Command::Ask { question, top_k } => {
            let index = load_index(&cli.index_dir, cli.embedder()?)?;
            let pipeline = QueryPipeline::new(&index, cli.generator()?).with_top_k(*top_k);

            let answer = pipeline.ask(question)?;
            println!("question: {question}");
            print_answer(&answer.answer, &answer.sources);
        }
        Command::Chat { top_k } => {
            let index = load_index(&cli.index_dir, cli.embedder()?)?;
            let pipeline = QueryPipeline::new(&index, cli.generator()?).with_top_k(*top_k);
            run_chat(&pipeline)?;
        }
    }

    Ok(())
}

fn run_chat<E: Embedder>(pipeline: &QueryPipeline<'_, E, HttpGenerator>) -> anyhow::Result<()> {
    let mut session = ChatSession::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!(
        "Ask a question about financial complaints. `:clear` resets the history, `:quit` exits."
    );

    loop {
        write!(stdout, "you> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            ":quit" | ":exit" => break,
            ":clear" => {
                session.clear();
                println!("history cleared");
            }
            ":history" => {
                for (position, turn) in session.turns().iter().enumerate() {
                    println!("[{}] {} -> {}", position + 1, turn.question, turn.answer.trim());
                }
            }
            question => match session.ask(pipeline, question) {
                Ok(turn) => print_answer(&turn.answer, &turn.sources),
                Err(error) => {
                    warn!(%error, "question failed");
                    println!("error: {error}");
                }
            },
        }
    }

    Ok(())
}

fn print_answer(answer: &str, sources: &[RetrievedChunk]) {
    println!("answer:\n{answer}");
    println!("sources:");
    for (line, source) in format_sources(sources, SOURCE_EXCERPT_CHARS)
        .into_iter()
        .zip(sources)
    {
        println!("{line}");
        println!(
            "    complaint_id={} product={} distance={:.4}",
            source.chunk.metadata.complaint_id, source.chunk.metadata.product, source.distance
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_are_accepted_after_the_subcommand() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "complaint-rag",
            "ask",
            "--question",
            "late fees?",
            "--index-dir",
            "elsewhere",
            "--temperature",
            "0.5",
        ])?;

        assert_eq!(cli.index_dir, PathBuf::from("elsewhere"));
        assert!((cli.temperature - 0.5).abs() < f32::EPSILON);
        assert!(matches!(cli.command, Command::Ask { top_k: DEFAULT_TOP_K, .. }));
        Ok(())
    }

    #[test]
    fn unset_options_fall_back_to_library_defaults() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["complaint-rag", "index"])?;

        assert_eq!(cli.raw_csv, PathBuf::from(DEFAULT_RAW_CSV));
        assert_eq!(cli.interim_csv, PathBuf::from(DEFAULT_INTERIM_CSV));
        assert_eq!(cli.max_new_tokens, GenerationOptions::default().max_new_tokens);
        match cli.command {
            Command::Index {
                chunk_size,
                chunk_overlap,
                ..
            } => {
                let defaults = ChunkingConfig::default();
                assert_eq!(chunk_size, defaults.max_chars);
                assert_eq!(chunk_overlap, defaults.overlap_chars);
            }
            _ => panic!("expected the index subcommand"),
        }
        Ok(())
    }
}
