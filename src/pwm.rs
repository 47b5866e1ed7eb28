use crate::error::{MotifError, Result};
use crate::fasta;
use crate::types::*;
use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

const MOTIF_COLUMN: &str = "Motif";
const RESIDUE_COLUMN: &str = "AA";

/// Pseudocount added to every residue at every position when building a PWM from peptides
pub const DEFAULT_PSEUDOCOUNT: f64 = 1.0;

/// Outcome of a PWM load: the motifs that decoded cleanly and the errors
/// for those that were skipped
#[derive(Debug, Default)]
pub struct PwmLoad {
    pub pwms: PwmCollection,
    pub skipped: Vec<MotifError>,
}

impl PwmLoad {
    fn merge(&mut self, other: PwmLoad) {
        for (id, pwm) in other.pwms {
            if self.pwms.insert(id.clone(), pwm).is_some() {
                warn!("Motif '{}' defined more than once, keeping the last definition", id);
            }
        }
        self.skipped.extend(other.skipped);
    }

    fn require_any(self, source: &Path) -> Result<PwmLoad> {
        if self.pwms.is_empty() {
            return Err(MotifError::NoValidPwms(format!(
                "no well-formed motif in {} ({} skipped)",
                source.display(),
                self.skipped.len()
            )));
        }
        Ok(self)
    }
}

/// Column separator for a delimited table, chosen from the file extension
pub(crate) fn separator_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("tab") | Some("txt") => b'\t',
        _ => b',',
    }
}

pub(crate) fn read_table(path: &Path) -> Result<DataFrame> {
    LazyCsvReader::new(path)
        .with_has_header(true)
        .with_separator(separator_for(path))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| MotifError::DataError(format!("{}: {}", path.display(), e)))
}

/// Finds the numbered position columns `0..W-1` and returns W.
fn position_width(df: &DataFrame) -> Result<usize> {
    let mut positions: Vec<usize> = df
        .get_column_names()
        .iter()
        .filter_map(|name| name.as_str().trim().parse::<usize>().ok())
        .collect();
    positions.sort_unstable();
    positions.dedup();

    let width = match positions.last() {
        Some(last) => last + 1,
        None => {
            return Err(MotifError::InvalidFileFormat(
                "no numbered position columns".into(),
            ))
        }
    };

    let missing: Vec<usize> = (0..width).filter(|p| positions.binary_search(p).is_err()).collect();
    if !missing.is_empty() {
        return Err(MotifError::malformed_pwm(
            "<all motifs>",
            format!(
                "missing position column(s) {:?}, expected 0..{}",
                missing,
                width - 1
            ),
        ));
    }
    Ok(width)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| MotifError::InvalidFileFormat(format!("missing '{}' column", name)))?
        .cast(&DataType::String)
        .map_err(|e| MotifError::DataError(e.to_string()))?;
    let values = column
        .str()
        .map_err(|e| MotifError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()))
        .collect();
    Ok(values)
}

fn position_column(df: &DataFrame, position: usize) -> Result<Vec<Option<f64>>> {
    let column = df
        .get_columns()
        .iter()
        .find(|c| c.name().as_str().trim().parse::<usize>().ok() == Some(position))
        .ok_or_else(|| {
            MotifError::InvalidFileFormat(format!("missing position column {}", position))
        })?
        .cast(&DataType::Float64)
        .map_err(|e| MotifError::DataError(e.to_string()))?;
    let values = column
        .f64()
        .map_err(|e| MotifError::DataError(e.to_string()))?
        .into_iter()
        .collect();
    Ok(values)
}

/// Decodes one motif group. `rows` are row indices into the table columns.
fn decode_motif(
    motif: &str,
    rows: &[usize],
    residues: &[Option<String>],
    positions: &[Vec<Option<f64>>],
) -> Result<Pwm> {
    let width = positions.len();
    let mut frequencies = Array2::<f64>::zeros((AMINO_ACIDS.len(), width));
    let mut seen = [false; 20];
    let mut problems = Vec::new();

    for &row in rows {
        let residue = residues[row].as_deref().unwrap_or("");
        let mut chars = residue.chars();
        let index = match (chars.next(), chars.next()) {
            (Some(c), None) => residue_index(c),
            _ => None,
        };
        let Some(index) = index else {
            problems.push(format!("unknown residue '{}'", residue));
            continue;
        };
        if seen[index] {
            problems.push(format!("duplicate residue '{}'", AMINO_ACIDS[index]));
            continue;
        }
        seen[index] = true;

        for (p, column) in positions.iter().enumerate() {
            match column[row] {
                Some(value) => frequencies[[index, p]] = value,
                None => problems.push(format!(
                    "no value for residue '{}' at position {}",
                    AMINO_ACIDS[index], p
                )),
            }
        }
    }

    let missing: String = AMINO_ACIDS
        .iter()
        .zip(seen.iter())
        .filter(|(_, present)| !**present)
        .map(|(aa, _)| *aa)
        .collect();
    if !missing.is_empty() {
        problems.push(format!("missing residue row(s) {}", missing));
    }

    if !problems.is_empty() {
        let expected: String = AMINO_ACIDS.iter().collect();
        return Err(MotifError::malformed_pwm(
            motif,
            format!(
                "{} (expected one row for each of {} and columns 0..{})",
                problems.join("; "),
                expected,
                width - 1
            ),
        ));
    }

    Pwm::new(motif, frequencies)
}

/// Builds PWMs from a table with a `Motif` column, an `AA` column and
/// numbered position columns `0..W-1`.
///
/// Rows are grouped by motif; each group must hold exactly one row for each
/// of the 20 canonical amino acids. A malformed group is skipped with a
/// warning and recorded in `PwmLoad::skipped`; the other motifs still load.
///
/// # Errors
/// * `MotifError::InvalidFileFormat` - required columns are absent
/// * `MotifError::MalformedPwm` - a position column inside `0..W-1` is missing
/// * `MotifError::NoValidPwms` - no motif group decoded cleanly
pub fn load_pwms(df: &DataFrame) -> Result<PwmLoad> {
    let width = position_width(df)?;
    let motifs = string_column(df, MOTIF_COLUMN)?;
    let residues = string_column(df, RESIDUE_COLUMN)?;
    let positions = (0..width)
        .map(|p| position_column(df, p))
        .collect::<Result<Vec<_>>>()?;

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, motif) in motifs.iter().enumerate() {
        match motif.as_deref() {
            Some(id) if !id.is_empty() => groups.entry(id).or_default().push(row),
            _ => warn!("Row {} has no motif identifier, ignoring it", row),
        }
    }

    let mut load = PwmLoad::default();
    for (motif, rows) in groups {
        match decode_motif(motif, &rows, &residues, &positions) {
            Ok(pwm) => {
                load.pwms.insert(motif.to_string(), pwm);
            }
            Err(e) => {
                warn!("Skipping motif: {}", e);
                load.skipped.push(e);
            }
        }
    }

    if load.pwms.is_empty() {
        return Err(MotifError::NoValidPwms(format!(
            "none of {} motif group(s) decoded",
            load.skipped.len()
        )));
    }
    debug!(
        "Decoded {} PWM(s) of width {}, skipped {}",
        load.pwms.len(),
        width,
        load.skipped.len()
    );
    Ok(load)
}

/// Reads a PWM table (comma separated, or tab separated for `.tsv`/`.txt`).
pub fn read_pwm_table(path: impl AsRef<Path>) -> Result<PwmLoad> {
    let path = path.as_ref();
    let df = read_table(path)?;
    load_pwms(&df)
}

fn table_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every PWM table in a directory and merges them.
///
/// A file that cannot be decoded is logged and recorded as skipped; the
/// load only fails when no file yields a PWM.
pub fn read_pwm_dir(dir: impl AsRef<Path>) -> Result<PwmLoad> {
    let dir = dir.as_ref();
    let mut load = PwmLoad::default();
    for path in table_files(dir, &["csv", "tsv", "txt"])? {
        match read_pwm_table(&path) {
            Ok(file_load) => load.merge(file_load),
            Err(e) => {
                warn!("Skipping PWM file {}: {}", path.display(), e);
                load.skipped.push(e);
            }
        }
    }
    load.require_any(dir)
}

/// Reads PWMs from either a single table or a directory of tables.
pub fn read_pwms(path: impl AsRef<Path>) -> Result<PwmLoad> {
    let path = path.as_ref();
    let load = if path.is_dir() {
        read_pwm_dir(path)?
    } else {
        read_pwm_table(path)?
    };
    info!(
        "Loaded {} PWM(s) from {} ({} skipped)",
        load.pwms.len(),
        path.display(),
        load.skipped.len()
    );
    Ok(load)
}

/// Writes PWMs as a `Motif`, `AA`, `0..W-1` table. All PWMs must share one width.
pub fn write_pwm_table(path: impl AsRef<Path>, pwms: &PwmCollection) -> Result<()> {
    let path = path.as_ref();
    let mut iter = pwms.values();
    let first = iter
        .next()
        .ok_or_else(|| MotifError::NoValidPwms("nothing to write".into()))?;
    let width = first.width();
    if let Some(other) = iter.find(|p| p.width() != width) {
        return Err(MotifError::WidthMismatch {
            query: other.motif_id().to_string(),
            comparison: first.motif_id().to_string(),
            query_width: other.width(),
            comparison_width: width,
        });
    }

    let mut motifs = Vec::with_capacity(pwms.len() * AMINO_ACIDS.len());
    let mut residues = Vec::with_capacity(motifs.capacity());
    let mut positions: Vec<Vec<f64>> = vec![Vec::with_capacity(motifs.capacity()); width];
    for pwm in pwms.values() {
        for (row, aa) in AMINO_ACIDS.iter().enumerate() {
            motifs.push(pwm.motif_id().to_string());
            residues.push(aa.to_string());
            for (p, column) in positions.iter_mut().enumerate() {
                column.push(pwm.frequencies()[[row, p]]);
            }
        }
    }

    let mut columns = vec![
        Column::new(MOTIF_COLUMN.into(), motifs),
        Column::new(RESIDUE_COLUMN.into(), residues),
    ];
    for (p, values) in positions.into_iter().enumerate() {
        columns.push(Column::new(p.to_string().into(), values));
    }
    let mut df = DataFrame::new(columns).map_err(|e| MotifError::DataError(e.to_string()))?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(separator_for(path))
        .finish(&mut df)
        .map_err(|e| MotifError::DataError(e.to_string()))?;
    Ok(())
}

/// Builds a PWM from aligned peptides of equal length.
///
/// Canonical residues are counted per position, `pseudocount` is added to
/// every (residue, position) cell and each position is normalised to sum
/// to 1. Characters outside the canonical alphabet (`X`, `-`, `.`) are
/// not counted.
///
/// # Errors
/// * `MotifError::InvalidParameter` - negative or non-finite pseudocount
/// * `MotifError::MalformedPwm` - no peptides, unequal lengths, or a
///   position with nothing to normalise
pub fn pwm_from_peptides<S: AsRef<str>>(
    motif_id: &str,
    peptides: &[S],
    pseudocount: f64,
) -> Result<Pwm> {
    if !pseudocount.is_finite() || pseudocount < 0.0 {
        return Err(MotifError::invalid_parameter(
            "pseudocount",
            pseudocount,
            "must be a non-negative number",
        ));
    }
    let width = match peptides.first() {
        Some(p) => p.as_ref().chars().count(),
        None => return Err(MotifError::malformed_pwm(motif_id, "no peptides")),
    };
    if width == 0 {
        return Err(MotifError::malformed_pwm(motif_id, "empty peptide"));
    }

    let mut counts = Array2::from_elem((AMINO_ACIDS.len(), width), pseudocount);
    for peptide in peptides {
        let peptide = peptide.as_ref();
        if peptide.chars().count() != width {
            return Err(MotifError::malformed_pwm(
                motif_id,
                format!(
                    "peptide '{}' has length {}, expected {}",
                    peptide,
                    peptide.chars().count(),
                    width
                ),
            ));
        }
        for (p, residue) in peptide.chars().enumerate() {
            if let Some(row) = residue_index(residue) {
                counts[[row, p]] += 1.0;
            }
        }
    }

    for (p, mut column) in counts.axis_iter_mut(Axis(1)).enumerate() {
        let total = column.sum();
        if total <= 0.0 {
            return Err(MotifError::malformed_pwm(
                motif_id,
                format!("position {} has no canonical residues", p),
            ));
        }
        column.mapv_inplace(|v| v / total);
    }

    Pwm::new(motif_id, counts)
}

/// Builds one PWM per FASTA file in `dir` (`.fasta`, `.fa`, `.txt`), named
/// after the file stem.
pub fn pwms_from_fasta_dir(
    dir: impl AsRef<Path>,
    pseudocount: f64,
    drop_duplicates: bool,
) -> Result<PwmLoad> {
    let dir = dir.as_ref();
    let mut load = PwmLoad::default();
    for path in table_files(dir, &["fasta", "fa", "txt"])? {
        let motif_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let built = fasta::read_fasta(&path)
            .and_then(|df| {
                if drop_duplicates {
                    fasta::unique_sequences(&df)
                } else {
                    Ok(df)
                }
            })
            .and_then(|df| fasta::sequences(&df))
            .and_then(|peptides| pwm_from_peptides(&motif_id, &peptides, pseudocount));
        match built {
            Ok(pwm) => {
                load.pwms.insert(motif_id, pwm);
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                load.skipped.push(e);
            }
        }
    }
    load.require_any(dir)
}
