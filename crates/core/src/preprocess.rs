use crate::error::PreprocessError;
use crate::models::{
    CleanedRecord, ComplaintRecord, CLEANED_NARRATIVE_COLUMN, COMPLAINT_ID_COLUMN,
    NARRATIVE_COLUMN, PRODUCT_COLUMN,
};
use regex::Regex;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

/// In-memory CSV table that keeps every column and row in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplaintTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ComplaintTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, PreprocessError> {
        if let Some(position) = rows.iter().position(|row| row.len() != headers.len()) {
            return Err(PreprocessError::InvalidArgument(format!(
                "row {} has {} fields, expected {}",
                position,
                rows[position].len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, PreprocessError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| PreprocessError::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<Vec<&str>, PreprocessError> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// Appends `name`, or overwrites it when the column already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), PreprocessError> {
        if values.len() != self.rows.len() {
            return Err(PreprocessError::InvalidArgument(format!(
                "column {name} has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }

        match self.column_index(name) {
            Ok(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            Err(_) => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<ComplaintRecord<'_>>, PreprocessError> {
        let product = self.column_index(PRODUCT_COLUMN)?;
        let narrative = self.column_index(NARRATIVE_COLUMN)?;

        Ok(self
            .rows
            .iter()
            .map(|row| ComplaintRecord {
                product: row[product].as_str(),
                narrative: Some(row[narrative].as_str()).filter(|text| !text.is_empty()),
            })
            .collect())
    }

    pub fn cleaned_records(&self) -> Result<Vec<CleanedRecord>, PreprocessError> {
        let complaint_id = self.column_index(COMPLAINT_ID_COLUMN)?;
        let product = self.column_index(PRODUCT_COLUMN)?;
        let cleaned = self.column_index(CLEANED_NARRATIVE_COLUMN)?;

        Ok(self
            .rows
            .iter()
            .map(|row| CleanedRecord {
                complaint_id: row[complaint_id].clone(),
                product: row[product].clone(),
                cleaned_narrative: row[cleaned].clone(),
            })
            .collect())
    }
}

pub fn load_complaints(path: &Path) -> Result<ComplaintTable, PreprocessError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    info!(path = %path.display(), rows = rows.len(), columns = headers.len(), "loaded table");
    ComplaintTable::new(headers, rows)
}

pub fn filter_complaints<S: AsRef<str>>(
    table: &ComplaintTable,
    allowed_products: &[S],
) -> Result<ComplaintTable, PreprocessError> {
    let allowed = allowed_products
        .iter()
        .map(|product| product.as_ref())
        .collect::<HashSet<_>>();

    let keep = table
        .records()?
        .iter()
        .map(|record| allowed.contains(record.product) && record.has_narrative())
        .collect::<Vec<_>>();

    let rows = table
        .rows
        .iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then(|| row.clone()))
        .collect::<Vec<_>>();

    debug!(before = table.len(), after = rows.len(), "filtered complaints");
    ComplaintTable::new(table.headers.clone(), rows)
}

/// Lowercases a narrative, drops the two boilerplate lead-ins and keeps only `[a-z0-9 .,]`.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    boilerplate: [Regex; 2],
    disallowed: Regex,
    whitespace: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, PreprocessError> {
        Ok(Self {
            boilerplate: [
                Regex::new(r"i am writing.*?complaint")?,
                Regex::new(r"i want to.*?complaint")?,
            ],
            disallowed: Regex::new(r"[^a-z0-9\s.,]")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Repeats the single pass until nothing changes, so `clean(clean(x)) == clean(x)`.
    /// Boilerplate split by extra whitespace or symbols only matches once those are normalised.
    pub fn clean(&self, text: &str) -> String {
        let mut cleaned = self.clean_once(text);
        loop {
            let again = self.clean_once(&cleaned);
            if again == cleaned {
                return cleaned;
            }
            cleaned = again;
        }
    }

    fn clean_once(&self, text: &str) -> String {
        let mut cleaned = text.to_lowercase();
        for pattern in &self.boilerplate {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        let cleaned = self.disallowed.replace_all(&cleaned, " ");
        self.whitespace
            .replace_all(&cleaned, " ")
            .trim()
            .to_string()
    }
}

pub fn clean_text(text: &str) -> Result<String, PreprocessError> {
    Ok(TextCleaner::new()?.clean(text))
}

pub fn clean_narratives(
    mut table: ComplaintTable,
    cleaner: &TextCleaner,
) -> Result<ComplaintTable, PreprocessError> {
    let cleaned = table
        .column(NARRATIVE_COLUMN)?
        .into_iter()
        .map(|narrative| cleaner.clean(narrative))
        .collect::<Vec<_>>();

    table.set_column(CLEANED_NARRATIVE_COLUMN, cleaned)?;
    Ok(table)
}

pub fn save_table(table: &ComplaintTable, path: &Path) -> Result<(), PreprocessError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = table.len(), "saved table");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessReport {
    pub loaded_rows: usize,
    pub with_narrative: usize,
    pub retained_rows: usize,
}

pub fn preprocess_file<S: AsRef<str>>(
    input: &Path,
    output: &Path,
    allowed_products: &[S],
) -> Result<PreprocessReport, PreprocessError> {
    let table = load_complaints(input)?;
    let with_narrative = table
        .records()?
        .iter()
        .filter(|record| record.has_narrative())
        .count();
    info!(
        with_narrative,
        without_narrative = table.len() - with_narrative,
        "narrative presence"
    );

    let filtered = filter_complaints(&table, allowed_products)?;
    let cleaner = TextCleaner::new()?;
    let cleaned = clean_narratives(filtered, &cleaner)?;
    save_table(&cleaned, output)?;

    Ok(PreprocessReport {
        loaded_rows: table.len(),
        with_narrative,
        retained_rows: cleaned.len(),
    })
}
