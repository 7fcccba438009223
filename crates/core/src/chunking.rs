use crate::error::IndexError;
use crate::models::{ChunkMetadata, CleanedRecord, TextChunk};
use crate::preprocess::ComplaintTable;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_CHARS: usize = 300;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    /// Tried coarsest first; the empty separator splits into characters.
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_CHARS,
            overlap_chars: DEFAULT_CHUNK_OVERLAP,
            separators: ["\n\n", "\n", ".", " ", ""]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.max_chars == 0 {
            return Err(IndexError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IndexError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    split_recursive(text, &config.separators, config)
}

fn split_recursive(text: &str, separators: &[String], config: &ChunkingConfig) -> Vec<String> {
    let mut separator = separators.last().map(String::as_str).unwrap_or_default();
    let mut finer: &[String] = &[];

    for (position, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            separator = "";
            break;
        }
        if text.contains(candidate.as_str()) {
            separator = candidate.as_str();
            finer = &separators[position + 1..];
            break;
        }
    }

    let mut chunks = Vec::new();
    let mut pending = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.max_chars {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, config));
            pending.clear();
        }

        if finer.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        } else {
            chunks.extend(split_recursive(piece, finer, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, config));
    }

    chunks
}

/// Each separator occurrence stays at the start of the piece that follows it.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        pieces.push(&text[start..index]);
        start = index;
    }
    pieces.push(&text[start..]);

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

/// Overlap is carried in whole pieces, so neighbours share at most `overlap_chars`
/// and nothing when the last piece of a window is longer than that.
fn merge_pieces(pieces: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut merged = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let length = char_len(piece);

        if total + length > config.max_chars && !window.is_empty() {
            push_window(&mut merged, &window);

            while total > config.overlap_chars
                || (total + length > config.max_chars && total > 0)
            {
                match window.pop_front() {
                    Some(front) => total -= char_len(front),
                    None => break,
                }
            }
        }

        window.push_back(piece);
        total += length;
    }

    push_window(&mut merged, &window);
    merged
}

fn push_window(merged: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        merged.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub fn build_chunks(
    records: &[CleanedRecord],
    config: &ChunkingConfig,
) -> Result<Vec<TextChunk>, IndexError> {
    config.validate()?;

    let mut chunks = Vec::new();
    for record in records {
        let pieces = split_text(&record.cleaned_narrative, config);
        debug!(
            complaint_id = %record.complaint_id,
            chunk_count = pieces.len(),
            "split narrative"
        );

        for (chunk_index, text) in pieces.into_iter().enumerate() {
            chunks.push(TextChunk {
                chunk_id: make_chunk_id(&record.complaint_id, chunk_index, &text),
                chunk_index,
                text,
                metadata: ChunkMetadata {
                    complaint_id: record.complaint_id.clone(),
                    product: record.product.clone(),
                    original_narrative: record.cleaned_narrative.clone(),
                },
            });
        }
    }

    info!(records = records.len(), chunks = chunks.len(), "created text chunks");
    Ok(chunks)
}

pub fn chunk_table(
    table: &ComplaintTable,
    config: &ChunkingConfig,
) -> Result<Vec<TextChunk>, IndexError> {
    let records = table.cleaned_records()?;
    build_chunks(&records, config)
}

fn make_chunk_id(complaint_id: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(complaint_id.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CLEANED_NARRATIVE_COLUMN, COMPLAINT_ID_COLUMN, PRODUCT_COLUMN};

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
            ..ChunkingConfig::default()
        }
    }

    fn dummy_records() -> Vec<CleanedRecord> {
        vec![
            CleanedRecord {
                complaint_id: "1".to_string(),
                product: "Credit card".to_string(),
                cleaned_narrative:
                    "this is a test complaint about credit cards. it has some details."
                        .to_string(),
            },
            CleanedRecord {
                complaint_id: "2".to_string(),
                product: "Buy Now, Pay Later (BNPL)".to_string(),
                cleaned_narrative:
                    "another test complaint for bnpl. many users are unhappy with fees."
                        .to_string(),
            },
        ]
    }

    #[test]
    fn adjacent_windows_overlap() {
        let chunks = split_text("aaaa bbbb cccc dddd eeee", &config(10, 5));
        assert_eq!(chunks, ["aaaa bbbb", "bbbb cccc", "cccc dddd", "dddd eeee"]);
    }

    #[test]
    fn overlap_is_dropped_when_no_trailing_piece_fits() {
        let chunks = split_text("aaaa bbbb cccc", &config(10, 2));
        assert_eq!(chunks, ["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn short_text_stays_whole() {
        let chunks = split_text("late fee on my card.", &ChunkingConfig::default());
        assert_eq!(chunks, ["late fee on my card."]);
    }

    #[test]
    fn empty_and_blank_text_produce_no_chunks() {
        let config = ChunkingConfig::default();
        assert!(split_text("", &config).is_empty());
        assert!(split_text("   ", &config).is_empty());
    }

    #[test]
    fn chunks_respect_max_length_and_come_from_source() {
        let text = "the bank charged an overdraft fee. i called support several times. \
                    nobody answered, supercalifragilisticexpialidocious delays everywhere. \
                    eventually the fee was refunded.";
        let config = config(24, 6);

        let chunks = split_text(text, &config);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 24, "chunk too long: {chunk:?}");
            assert!(text.contains(chunk.as_str()), "not a substring: {chunk:?}");
        }
    }

    #[test]
    fn atomic_unit_is_kept_whole_without_character_fallback() {
        let config = ChunkingConfig {
            max_chars: 5,
            overlap_chars: 1,
            separators: vec![" ".to_string()],
        };
        let chunks = split_text("ab overdrafts cd", &config);
        assert_eq!(chunks, ["ab", "overdrafts", "cd"]);
    }

    #[test]
    fn every_chunk_carries_parent_metadata() -> Result<(), IndexError> {
        let records = dummy_records();
        let chunks = build_chunks(&records, &config(20, 5))?;

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            let parent = records
                .iter()
                .find(|record| record.complaint_id == chunk.metadata.complaint_id)
                .expect("chunk has a parent record");
            assert_eq!(chunk.metadata.product, parent.product);
            assert_eq!(chunk.metadata.original_narrative, parent.cleaned_narrative);
            assert!(chunk.text.chars().count() <= 20);
        }

        let first_record = chunks
            .iter()
            .filter(|chunk| chunk.metadata.complaint_id == "1")
            .map(|chunk| chunk.chunk_index)
            .collect::<Vec<_>>();
        assert_eq!(first_record, (0..first_record.len()).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn chunk_ids_are_deterministic() -> Result<(), IndexError> {
        let first = build_chunks(&dummy_records(), &config(20, 5))?;
        let second = build_chunks(&dummy_records(), &config(20, 5))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let result = build_chunks(&dummy_records(), &config(10, 10));
        assert!(matches!(result, Err(IndexError::InvalidChunkConfig(_))));
    }

    #[test]
    fn chunk_table_requires_id_column() {
        let table = ComplaintTable::new(
            vec![
                PRODUCT_COLUMN.to_string(),
                CLEANED_NARRATIVE_COLUMN.to_string(),
            ],
            vec![vec!["Credit card".to_string(), "text".to_string()]],
        )
        .expect("rows match headers");

        let result = chunk_table(&table, &ChunkingConfig::default());
        assert!(matches!(
            result,
            Err(IndexError::Table(crate::PreprocessError::MissingColumn(column)))
                if column == COMPLAINT_ID_COLUMN
        ));
    }
}
