use crate::error::{MotifError, Result};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads sequences from a FASTA format file and converts them into a Polars DataFrame.
///
/// # Arguments
/// * `filename` - Path to the FASTA file to read
///
/// # Returns
/// * `Result<DataFrame>` - A DataFrame with two columns:
///   - "label": The sequence identifiers (without '>' prefix)
///   - "sequence": The corresponding peptide sequences in uppercase
///
/// # Errors
/// * Returns `MotifError::InvalidFileFormat` if no sequences are found
/// * Returns `MotifError::DataError` if DataFrame creation fails
/// * Returns `MotifError::Io` for file reading issues
pub fn read_fasta(filename: impl AsRef<Path>) -> Result<DataFrame> {
    let mut sequences: Vec<(String, String)> = Vec::new();
    let file = File::open(filename.as_ref())?;
    let reader = BufReader::new(file);

    let mut current_header: Option<String> = None;
    let mut current_sequence = String::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();

        if let Some(header) = line.strip_prefix('>') {
            if let Some(previous) = current_header.take() {
                sequences.push((previous, current_sequence.to_uppercase()));
                current_sequence.clear();
            }
            current_header = Some(header.to_string());
        } else if !line.is_empty() {
            current_sequence.push_str(line);
        }
    }

    if let Some(previous) = current_header {
        sequences.push((previous, current_sequence.to_uppercase()));
    }

    if sequences.is_empty() {
        return Err(MotifError::InvalidFileFormat(format!(
            "No sequences found in {}",
            filename.as_ref().display()
        )));
    }

    let (labels, sequences): (Vec<String>, Vec<String>) = sequences.into_iter().unzip();
    let df = DataFrame::new(vec![
        Column::new("label".into(), labels),
        Column::new("sequence".into(), sequences),
    ])
    .map_err(|e| MotifError::DataError(e.to_string()))?;

    Ok(df)
}

/// Drops rows whose sequence was already seen, keeping the first occurrence.
///
/// Duplicate peptides over-weight a matrix built from them.
pub fn unique_sequences(df: &DataFrame) -> Result<DataFrame> {
    let sequences = df
        .column("sequence")
        .map_err(|e| MotifError::DataError(e.to_string()))?
        .str()
        .map_err(|e| MotifError::DataError(e.to_string()))?;

    let mut seen = HashSet::new();
    let mask: Vec<bool> = sequences
        .into_iter()
        .map(|seq| seq.map(|s| seen.insert(s.to_string())).unwrap_or(false))
        .collect();

    df.filter(&BooleanChunked::from_slice("keep".into(), &mask))
        .map_err(|e| MotifError::DataError(e.to_string()))
}

/// Extracts the "sequence" column as owned strings, skipping nulls.
pub fn sequences(df: &DataFrame) -> Result<Vec<String>> {
    let sequences = df
        .column("sequence")
        .map_err(|e| MotifError::DataError(e.to_string()))?
        .str()
        .map_err(|e| MotifError::DataError(e.to_string()))?;

    Ok(sequences
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect())
}
