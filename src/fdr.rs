//! Empirical FDR of observed kinase/module scores against per-module null pools.
//!
//! For an observed score `s` and a module's pool `P`,
//! `FDR(s) = |{x in P : x < s}| / |P|`. Ties with `s` are not counted.
//! No multiple-testing correction is applied; the analyst picks a cutoff.

use crate::error::{MotifError, Result};
use crate::pwm::separator_for;
use crate::scores::{NullScore, ObservedScore};
use log::{info, warn};
use polars::prelude::*;
use statrs::statistics::{Data, Median, Statistics};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;

/// Null scores for one module, pooled over every shuffled kinase
#[derive(Debug, Clone, PartialEq)]
pub struct NullPool {
    module: String,
    /// ascending
    scores: Vec<f64>,
}

/// Descriptive statistics of a null pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSummary {
    pub module: String,
    pub size: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl NullPool {
    pub fn new(module: impl Into<String>, mut scores: Vec<f64>) -> Self {
        scores.sort_by(f64::total_cmp);
        NullPool {
            module: module.into(),
            scores,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Number of pooled scores strictly below `score`
    pub fn count_less(&self, score: f64) -> usize {
        self.scores.partition_point(|&x| x < score)
    }

    /// `count_less(score) / len()`, or `None` for an empty pool
    pub fn fdr(&self, score: f64) -> Option<f64> {
        if self.scores.is_empty() {
            None
        } else {
            Some(self.count_less(score) as f64 / self.scores.len() as f64)
        }
    }

    pub fn summary(&self) -> Option<PoolSummary> {
        let (&min, &max) = (self.scores.first()?, self.scores.last()?);
        Some(PoolSummary {
            module: self.module.clone(),
            size: self.scores.len(),
            mean: Statistics::mean(self.scores.iter()),
            std_dev: Statistics::std_dev(self.scores.iter()),
            median: Data::new(self.scores.clone()).median(),
            min,
            max,
        })
    }
}

/// Null pools keyed by module id
pub type NullPools = BTreeMap<String, NullPool>;

/// Pools null scores by module, across all kinases that were shuffled
/// against it.
pub fn pool_by_module(scores: impl IntoIterator<Item = NullScore>) -> NullPools {
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for s in scores {
        grouped.entry(s.module).or_default().push(s.score);
    }
    grouped
        .into_iter()
        .map(|(module, scores)| (module.clone(), NullPool::new(module, scores)))
        .collect()
}

/// Logs a one-line summary of every pool
pub fn log_pool_summaries(pools: &NullPools) {
    for pool in pools.values() {
        match pool.summary() {
            Some(s) => info!(
                "Null pool '{}': n={} mean={:.4} sd={:.4} median={:.4} range=[{:.4}, {:.4}]",
                s.module, s.size, s.mean, s.std_dev, s.median, s.min, s.max
            ),
            None => warn!("Null pool '{}' is empty", pool.module()),
        }
    }
}

/// FDR estimate for one kinase/module pair.
///
/// `score` is `None` when the kinase has no observed score for the module;
/// the row is still emitted so the kinase x module matrix stays complete.
#[derive(Debug, Clone, PartialEq)]
pub struct FdrRecord {
    pub score: Option<f64>,
    pub kinase: String,
    pub module: String,
    pub counts_less_than: Option<usize>,
    pub number_of_scores: usize,
    pub fdr: Option<f64>,
}

impl FdrRecord {
    pub fn has_score(&self) -> bool {
        self.score.is_some()
    }
}

fn by_fdr(a: &FdrRecord, b: &FdrRecord) -> Ordering {
    let fdr = match (a.fdr, b.fdr) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    fdr.then_with(|| a.module.cmp(&b.module))
        .then_with(|| a.kinase.cmp(&b.kinase))
}

/// Estimates the FDR of every kinase/module pair.
///
/// The kinase axis is `kinases` plus every kinase with an observed score;
/// the module axis is `modules` plus every module seen in `observed` or
/// `pools`. Exactly one record is produced per (kinase, module) on those
/// axes. Records are sorted by ascending FDR; rows without an FDR come last.
pub fn estimate(
    observed: &[ObservedScore],
    pools: &NullPools,
    kinases: &[String],
    modules: &[String],
) -> Vec<FdrRecord> {
    let mut kinase_axis: BTreeSet<&str> = kinases.iter().map(String::as_str).collect();
    let mut module_axis: BTreeSet<&str> = modules.iter().map(String::as_str).collect();
    module_axis.extend(pools.keys().map(String::as_str));

    let mut by_pair: HashMap<(&str, &str), f64> = HashMap::with_capacity(observed.len());
    for o in observed {
        kinase_axis.insert(o.kinase.as_str());
        module_axis.insert(o.module.as_str());
        if by_pair
            .insert((o.kinase.as_str(), o.module.as_str()), o.score)
            .is_some()
        {
            warn!(
                "Duplicate observed score for kinase '{}' and module '{}', keeping the last",
                o.kinase, o.module
            );
        }
    }

    let mut records = Vec::with_capacity(kinase_axis.len() * module_axis.len());
    for &module in &module_axis {
        let pool = pools.get(module);
        if pool.map_or(true, NullPool::is_empty) {
            warn!("No null scores for module '{}', FDR is undefined", module);
        }
        let number_of_scores = pool.map_or(0, NullPool::len);

        for &kinase in &kinase_axis {
            let score = by_pair.get(&(kinase, module)).copied();
            let (counts_less_than, fdr) = match (score, pool) {
                (Some(s), Some(pool)) if !pool.is_empty() => {
                    (Some(pool.count_less(s)), pool.fdr(s))
                }
                _ => (None, None),
            };
            records.push(FdrRecord {
                score,
                kinase: kinase.to_string(),
                module: module.to_string(),
                counts_less_than,
                number_of_scores,
                fdr,
            });
        }
    }

    records.sort_by(by_fdr);
    records
}

/// Writes `Scores, Kinase, Module, Counts_Less_Than, Number_of_Scores, FDR`.
/// Missing values are left empty.
pub fn write_fdr_table(path: impl AsRef<Path>, records: &[FdrRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut df = DataFrame::new(vec![
        Column::new(
            "Scores".into(),
            records.iter().map(|r| r.score).collect::<Vec<Option<f64>>>(),
        ),
        Column::new(
            "Kinase".into(),
            records.iter().map(|r| r.kinase.as_str()).collect::<Vec<&str>>(),
        ),
        Column::new(
            "Module".into(),
            records.iter().map(|r| r.module.as_str()).collect::<Vec<&str>>(),
        ),
        Column::new(
            "Counts_Less_Than".into(),
            records
                .iter()
                .map(|r| r.counts_less_than.map(|c| c as u64))
                .collect::<Vec<Option<u64>>>(),
        ),
        Column::new(
            "Number_of_Scores".into(),
            records
                .iter()
                .map(|r| r.number_of_scores as u64)
                .collect::<Vec<u64>>(),
        ),
        Column::new(
            "FDR".into(),
            records.iter().map(|r| r.fdr).collect::<Vec<Option<f64>>>(),
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
