//! End-to-end batch: observed scores, null pools, FDR table, and the
//! counters that make skipped work visible.

use crate::config::PipelineConfig;
use crate::divergence;
use crate::error::{ErrorKind, MotifError, Result};
use crate::fdr::{self, FdrRecord, NullPools};
use crate::pwm::PwmLoad;
use crate::scores::{write_null_scores, write_score_table, ObservedScore};
use crate::shuffle::{self, NullRun};
use crate::types::{Pwm, PwmCollection};
use log::{info, warn};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};

pub const OBSERVED_SCORES_FILE: &str = "observed_scores.tsv";
pub const NULL_SCORES_DIR: &str = "null_scores";
pub const FDR_FILE: &str = "fdr.tsv";

/// Unshuffled scores for every kinase/module pair, plus the pairs that failed
#[derive(Debug, Default)]
pub struct ScoreRun {
    pub scores: Vec<ObservedScore>,
    pub skipped: Vec<MotifError>,
}

impl ScoreRun {
    /// Fails when every kinase/module pair was skipped
    pub fn require_scores(&self) -> Result<()> {
        if self.scores.is_empty() {
            return Err(MotifError::NothingScored(format!(
                "no kinase/module pair could be scored ({} pair(s) skipped)",
                self.skipped.len()
            )));
        }
        Ok(())
    }
}

/// Scores every kinase PWM against every module PWM once.
///
/// A pair that fails (width mismatch, non-positive frequency) is logged
/// and recorded in `ScoreRun::skipped`; the rest of the batch continues.
pub fn score_all(kinases: &PwmCollection, modules: &PwmCollection) -> ScoreRun {
    let kinase_list: Vec<&Pwm> = kinases.values().collect();
    let results: Vec<Result<ObservedScore>> = kinase_list
        .par_iter()
        .flat_map_iter(|kinase| {
            modules.values().map(move |module| {
                divergence::score(kinase, module).map(|score| ObservedScore {
                    score,
                    kinase: kinase.motif_id().to_string(),
                    module: module.motif_id().to_string(),
                })
            })
        })
        .collect();

    let mut run = ScoreRun::default();
    for result in results {
        match result {
            Ok(score) => run.scores.push(score),
            Err(e) => {
                warn!("Skipping pair: {}", e);
                run.skipped.push(e);
            }
        }
    }
    run
}

/// Counts reported at the end of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub motifs_loaded: usize,
    pub motifs_skipped: usize,
    pub pairs_scored: usize,
    pub pairs_width_mismatch: usize,
    pub pairs_invalid_frequency: usize,
    pub null_scores: usize,
    pub shuffles_abandoned: usize,
    pub fdr_records: usize,
    pub no_score_rows: usize,
}

impl RunSummary {
    pub fn record_load(&mut self, load: &PwmLoad) {
        self.motifs_loaded += load.pwms.len();
        self.motifs_skipped += load.skipped.len();
    }

    fn record_pair_failures<'a>(&mut self, errors: impl IntoIterator<Item = &'a MotifError>) {
        for e in errors {
            match e.kind() {
                ErrorKind::WidthMismatch => self.pairs_width_mismatch += 1,
                ErrorKind::InvalidFrequency => self.pairs_invalid_frequency += 1,
                _ => {}
            }
        }
    }

    pub fn record_scores(&mut self, run: &ScoreRun) {
        self.pairs_scored += run.scores.len();
        self.record_pair_failures(&run.skipped);
    }

    pub fn record_null(&mut self, run: &NullRun) {
        self.null_scores += run.score_count();
        self.shuffles_abandoned += run.abandoned_count();
    }

    pub fn record_fdr(&mut self, records: &[FdrRecord]) {
        self.fdr_records += records.len();
        self.no_score_rows += records.iter().filter(|r| !r.has_score()).count();
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "motifs loaded: {}, motifs skipped: {}, pairs scored: {}, \
             pairs skipped (width mismatch): {}, pairs skipped (invalid frequency): {}, \
             null scores: {}, shuffles abandoned: {}, FDR rows: {} ({} without score)",
            self.motifs_loaded,
            self.motifs_skipped,
            self.pairs_scored,
            self.pairs_width_mismatch,
            self.pairs_invalid_frequency,
            self.null_scores,
            self.shuffles_abandoned,
            self.fdr_records,
            self.no_score_rows
        )
    }
}

/// Everything a full run produced
#[derive(Debug)]
pub struct PipelineOutput {
    pub observed: Vec<ObservedScore>,
    pub pools: NullPools,
    pub records: Vec<FdrRecord>,
    pub summary: RunSummary,
    pub written: Vec<PathBuf>,
}

/// Runs observed scoring, null generation and FDR estimation in one pass.
///
/// `kinase_universe` lists kinases that must appear in the FDR table even
/// without a PWM. When `output_dir` is given, the observed score table,
/// the null-score files and the FDR table are written there.
pub fn run(
    kinases: &PwmLoad,
    modules: &PwmLoad,
    kinase_universe: &[String],
    config: &PipelineConfig,
    output_dir: Option<&Path>,
) -> Result<PipelineOutput> {
    config.validate()?;
    let mut summary = RunSummary::default();
    summary.record_load(kinases);
    summary.record_load(modules);

    let scored = score_all(&kinases.pwms, &modules.pwms);
    summary.record_scores(&scored);
    info!(
        "Scored {} observed pair(s), skipped {}",
        scored.scores.len(),
        scored.skipped.len()
    );
    scored.require_scores()?;

    let mut written = Vec::new();
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
        let observed_path = dir.join(OBSERVED_SCORES_FILE);
        write_score_table(&observed_path, &scored.scores)?;
        written.push(observed_path);
    }

    let partition_dir = output_dir
        .filter(|_| config.write_partitions)
        .map(|dir| dir.join(NULL_SCORES_DIR));
    let null_run = shuffle::generate_null_scores(
        &kinases.pwms,
        &modules.pwms,
        &config.shuffle,
        partition_dir.as_deref(),
    )?;
    summary.record_null(&null_run);
    null_run.require_scores()?;
    written.extend(null_run.written());

    let null_scores = null_run.into_scores();
    if let (Some(dir), false) = (output_dir, config.write_partitions) {
        written.extend(write_null_scores(dir.join(NULL_SCORES_DIR), &null_scores)?);
    }

    let pools = fdr::pool_by_module(null_scores);
    fdr::log_pool_summaries(&pools);

    let mut universe: Vec<String> = kinase_universe.to_vec();
    universe.extend(kinases.pwms.keys().cloned());
    let module_ids: Vec<String> = modules.pwms.keys().cloned().collect();
    let records = fdr::estimate(&scored.scores, &pools, &universe, &module_ids);
    summary.record_fdr(&records);

    if let Some(dir) = output_dir {
        let fdr_path = dir.join(FDR_FILE);
        fdr::write_fdr_table(&fdr_path, &records)?;
        written.push(fdr_path);
    }

    info!("{}", summary);
    Ok(PipelineOutput {
        observed: scored.scores,
        pools,
        records,
        summary,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn pwm(id: &str, width: usize, hot: usize) -> Pwm {
        let mut m = Array2::from_elem((20, width), 0.03);
        for p in 0..width {
            m[[(hot + p) % 20, p]] = 0.43;
        }
        Pwm::new(id, m).unwrap()
    }

    fn collection(pwms: Vec<Pwm>) -> PwmCollection {
        pwms.into_iter()
            .map(|p| (p.motif_id().to_string(), p))
            .collect()
    }

    #[test]
    fn score_all_contains_failures() {
        let mut bad = pwm("Bad", 5, 1).frequencies().to_owned();
        bad[[4, 4]] = -0.1;
        let kinases = collection(vec![
            pwm("Hog1", 5, 0),
            pwm("Short", 3, 0),
            Pwm::new("Bad", bad).unwrap(),
        ]);
        let modules = collection(vec![pwm("M1", 5, 7), pwm("M2", 5, 12)]);

        let run = score_all(&kinases, &modules);
        assert_eq!(run.scores.len(), 2);

        let mut summary = RunSummary::default();
        summary.record_scores(&run);
        assert_eq!(summary.pairs_scored, 2);
        assert_eq!(summary.pairs_width_mismatch, 2);
        assert_eq!(summary.pairs_invalid_frequency, 2);
    }

    #[test]
    fn run_covers_every_pair() {
        let kinases = PwmLoad {
            pwms: collection(vec![pwm("Hog1", 5, 0), pwm("Cdc28", 5, 9)]),
            skipped: vec![],
        };
        let modules = PwmLoad {
            pwms: collection(vec![pwm("M1", 5, 0), pwm("M2", 5, 4)]),
            skipped: vec![MotifError::malformed_pwm("M3", "missing residue row(s) W")],
        };
        let mut config = PipelineConfig::default();
        config.shuffle.iterations = 20;
        config.shuffle.workers = 2;
        config.shuffle.seed = Some(17);

        let out = run(&kinases, &modules, &["Snf1".to_string()], &config, None).unwrap();
        assert_eq!(out.records.len(), 3 * 2);
        assert_eq!(out.summary.no_score_rows, 2);
        assert_eq!(out.summary.motifs_skipped, 1);
        assert_eq!(out.summary.null_scores, 2 * 2 * 20);
        assert_eq!(out.pools["M1"].len(), 2 * 20);

        // Hog1 matches M1 exactly, so no shuffle scores below it
        let hog1_m1 = out
            .records
            .iter()
            .find(|r| r.kinase == "Hog1" && r.module == "M1")
            .unwrap();
        assert_eq!(hog1_m1.fdr, Some(0.0));
        assert!(out.written.is_empty());
    }

    #[test]
    fn run_fails_when_no_pair_shares_a_width() {
        let kinases = PwmLoad {
            pwms: collection(vec![pwm("Hog1", 5, 0), pwm("Cdc28", 5, 9)]),
            skipped: vec![],
        };
        let modules = PwmLoad {
            pwms: collection(vec![pwm("M1", 3, 0)]),
            skipped: vec![],
        };
        let mut config = PipelineConfig::default();
        config.shuffle.iterations = 4;
        config.shuffle.workers = 1;
        config.shuffle.seed = Some(3);
        let dir = tempfile::tempdir().unwrap();

        let result = run(&kinases, &modules, &[], &config, Some(dir.path()));
        assert!(matches!(result, Err(MotifError::NothingScored(_))));
        assert!(!dir.path().join(FDR_FILE).exists());
    }
}
