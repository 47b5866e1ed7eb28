//! Score records and their on-disk forms.
//!
//! Null scores are written one file per kinase: the kinase id on the first
//! line, then one `(score, 'module')` tuple per line. Observed scores are a
//! `Scores`, `Kinase`, `Module` table.

use crate::error::{MotifError, Result};
use crate::pwm::{read_table, separator_for};
use log::warn;
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Divergence between a shuffled kinase PWM and a module PWM
#[derive(Debug, Clone, PartialEq)]
pub struct NullScore {
    pub score: f64,
    pub kinase: String,
    pub module: String,
}

/// Divergence between an unshuffled kinase PWM and a module PWM
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedScore {
    pub score: f64,
    pub kinase: String,
    pub module: String,
}

/// File name for a motif id, keeping only characters safe on every platform
pub(crate) fn file_stem_for(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn render_tuple(score: f64, module: &str) -> String {
    format!("({:?}, '{}')", score, module.replace('\'', "\\'"))
}

fn parse_tuple(line: &str) -> Option<(f64, String)> {
    let inner = line.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (score, module) = inner.split_once(',')?;
    let score = score.trim().parse::<f64>().ok()?;
    let module = module.trim();
    let module = module
        .strip_prefix('\'')
        .and_then(|m| m.strip_suffix('\''))
        .or_else(|| module.strip_prefix('"').and_then(|m| m.strip_suffix('"')))?;
    Some((score, module.replace("\\'", "'")))
}

/// Writes null scores into `dir`, one file per kinase. Existing files are replaced.
///
/// Kinase ids that clean up to the same file name get a numeric suffix, so
/// no kinase overwrites another. Returns the paths written, in kinase order.
pub fn write_null_scores(dir: impl AsRef<Path>, scores: &[NullScore]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut by_kinase: BTreeMap<&str, Vec<&NullScore>> = BTreeMap::new();
    for s in scores {
        by_kinase.entry(s.kinase.as_str()).or_default().push(s);
    }

    let mut stems = HashSet::with_capacity(by_kinase.len());
    let mut written = Vec::with_capacity(by_kinase.len());
    for (kinase, rows) in by_kinase {
        let base = file_stem_for(kinase);
        let mut stem = base.clone();
        let mut suffix = 1;
        while !stems.insert(stem.clone()) {
            suffix += 1;
            stem = format!("{}_{}", base, suffix);
        }
        if stem != base {
            warn!("Kinase '{}' written to {}.csv to keep file names distinct", kinase, stem);
        }
        let path = dir.join(format!("{}.csv", stem));
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "{}", kinase)?;
        for row in rows {
            writeln!(out, "{}", render_tuple(row.score, &row.module))?;
        }
        out.flush()?;
        written.push(path);
    }
    Ok(written)
}

/// Reads one null-score file.
///
/// # Errors
/// * `MotifError::InvalidFileFormat` - empty file or a line that is not a `(score, 'module')` tuple
pub fn read_null_scores(path: impl AsRef<Path>) -> Result<Vec<NullScore>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines().enumerate();

    let kinase = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line.trim().to_string();
                }
            }
            None => {
                return Err(MotifError::InvalidFileFormat(format!(
                    "{} has no kinase header",
                    path.display()
                )))
            }
        }
    };

    let mut scores = Vec::new();
    for (number, line) in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (score, module) = parse_tuple(&line).ok_or_else(|| {
            MotifError::InvalidFileFormat(format!(
                "{} line {}: expected (score, 'module'), found '{}'",
                path.display(),
                number + 1,
                line
            ))
        })?;
        scores.push(NullScore {
            score,
            kinase: kinase.clone(),
            module,
        });
    }
    Ok(scores)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    Ok(())
}

/// Reads every null-score file under `dir`, including per-worker sub-directories.
pub fn read_null_dir(dir: impl AsRef<Path>) -> Result<Vec<NullScore>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    if files.is_empty() {
        warn!("No null-score files found under {}", dir.display());
    }

    let mut scores = Vec::new();
    for path in files {
        scores.extend(read_null_scores(&path)?);
    }
    Ok(scores)
}

/// Writes observed scores as a `Scores`, `Kinase`, `Module` table.
pub fn write_score_table(path: impl AsRef<Path>, scores: &[ObservedScore]) -> Result<()> {
    let path = path.as_ref();
    let mut df = DataFrame::new(vec![
        Column::new(
            "Scores".into(),
            scores.iter().map(|s| s.score).collect::<Vec<f64>>(),
        ),
        Column::new(
            "Kinase".into(),
            scores.iter().map(|s| s.kinase.as_str()).collect::<Vec<&str>>(),
        ),
        Column::new(
            "Module".into(),
            scores.iter().map(|s| s.module.as_str()).collect::<Vec<&str>>(),
        ),
    ])
    .map_err(|e| MotifError::DataError(e.to_string()))?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(separator_for(path))
        .finish(&mut df)
        .map_err(|e| MotifError::DataError(e.to_string()))?;
    Ok(())
}

/// Reads a `Scores`, `Kinase`, `Module` table. Rows with an empty score are dropped.
pub fn read_score_table(path: impl AsRef<Path>) -> Result<Vec<ObservedScore>> {
    let path = path.as_ref();
    let df = read_table(path)?;

    let column = |name: &str, dtype: DataType| -> Result<Column> {
        df.column(name)
            .map_err(|_| {
                MotifError::InvalidFileFormat(format!(
                    "{} is missing the '{}' column",
                    path.display(),
                    name
                ))
            })?
            .cast(&dtype)
            .map_err(|e| MotifError::DataError(e.to_string()))
    };
    let score_col = column("Scores", DataType::Float64)?;
    let kinase_col = column("Kinase", DataType::String)?;
    let module_col = column("Module", DataType::String)?;

    let data_err = |e: PolarsError| MotifError::DataError(e.to_string());
    let scores = score_col.f64().map_err(data_err)?;
    let kinases = kinase_col.str().map_err(data_err)?;
    let modules = module_col.str().map_err(data_err)?;

    let mut observed = Vec::with_capacity(df.height());
    for ((score, kinase), module) in scores.into_iter().zip(kinases).zip(modules) {
        match (score, kinase, module) {
            (Some(score), Some(kinase), Some(module)) => observed.push(ObservedScore {
                score,
                kinase: kinase.to_string(),
                module: module.to_string(),
            }),
            (None, Some(kinase), Some(module)) => {
                warn!("No score for kinase '{}' and module '{}', dropping row", kinase, module)
            }
            _ => warn!("Incomplete row in {}, dropping it", path.display()),
        }
    }
    Ok(observed)
}

/// Reads identifiers one per line, ignoring blank lines and `#` comments.
pub fn read_id_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.trim();
        if !id.is_empty() && !id.starts_with('#') {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}
