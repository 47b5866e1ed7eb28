//! Null distribution generation by shuffling kinase PWMs.
//!
//! One shuffle permutes, independently at every position, which residue
//! owns which frequency, then permutes the order of the positions. Each
//! shuffled kinase PWM is scored against a module PWM; the scores form
//! that module's null pool.

use crate::config::ShuffleConfig;
use crate::divergence;
use crate::error::{MotifError, Result};
use crate::scores::{write_null_scores, NullScore};
use crate::types::{Pwm, PwmCollection};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Reassigns each position's frequencies to residues at random
fn shuffle_residues<R: Rng + ?Sized>(frequencies: &mut Array2<f64>, rng: &mut R) {
    for mut column in frequencies.axis_iter_mut(Axis(1)) {
        let mut values = column.to_vec();
        values.shuffle(rng);
        column.assign(&Array1::from(values));
    }
}

/// Permutes the order of the position columns
fn shuffle_positions<R: Rng + ?Sized>(frequencies: &Array2<f64>, rng: &mut R) -> Array2<f64> {
    let mut order: Vec<usize> = (0..frequencies.ncols()).collect();
    order.shuffle(rng);
    frequencies.select(Axis(1), &order)
}

/// Produces a randomized copy of `pwm` with the same motif id.
///
/// Every position keeps its multiset of values and the set of per-position
/// value multisets is preserved; only residue attribution and position
/// labels change. The input is left untouched, so it can be shuffled again
/// independently.
pub fn shuffle_pwm<R: Rng + ?Sized>(pwm: &Pwm, rng: &mut R) -> Pwm {
    let mut frequencies = pwm.frequencies().to_owned();
    shuffle_residues(&mut frequencies, rng);
    pwm.with_frequencies(shuffle_positions(&frequencies, rng))
}

/// Seeded generator for one worker; `None` draws from system entropy
pub fn worker_rng(seed: Option<u64>, worker: usize) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(worker as u64)),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Everything one worker produced; owned by that worker until the merge
#[derive(Debug, Default)]
pub struct WorkerPartition {
    pub worker: usize,
    pub scores: Vec<NullScore>,
    /// Iterations abandoned because scoring failed
    pub abandoned: Vec<MotifError>,
    /// Null-score files this worker wrote, if it was given a directory
    pub written: Vec<PathBuf>,
}

/// Output of a null generation run, one partition per worker
#[derive(Debug, Default)]
pub struct NullRun {
    pub partitions: Vec<WorkerPartition>,
    /// Kinase/module pairs never shuffled because their widths differ
    pub width_mismatches: Vec<MotifError>,
}

impl NullRun {
    pub fn score_count(&self) -> usize {
        self.partitions.iter().map(|p| p.scores.len()).sum()
    }

    pub fn abandoned_count(&self) -> usize {
        self.partitions.iter().map(|p| p.abandoned.len()).sum()
    }

    /// Fails when not a single shuffle could be scored
    pub fn require_scores(&self) -> Result<()> {
        if self.score_count() == 0 {
            return Err(MotifError::NothingScored(format!(
                "no null score was produced ({} pair(s) with mismatched widths, {} shuffle(s) abandoned)",
                self.width_mismatches.len(),
                self.abandoned_count()
            )));
        }
        Ok(())
    }

    /// Every file written by the workers, in worker order
    pub fn written(&self) -> Vec<PathBuf> {
        self.partitions
            .iter()
            .flat_map(|p| p.written.iter().cloned())
            .collect()
    }

    /// Concatenates every worker's scores
    pub fn into_scores(self) -> Vec<NullScore> {
        self.partitions
            .into_iter()
            .flat_map(|p| p.scores.into_iter())
            .collect()
    }
}

/// Directory owned by one worker under a null-score output directory
pub fn partition_dir(dir: &Path, worker: usize) -> PathBuf {
    dir.join(format!("worker_{}", worker))
}

fn run_worker(
    worker: usize,
    pairs: &[(&Pwm, &Pwm)],
    config: &ShuffleConfig,
    output_dir: Option<&Path>,
) -> Result<WorkerPartition> {
    let iterations = config.iterations_for(worker);
    let mut rng = worker_rng(config.seed, worker);
    let mut partition = WorkerPartition {
        worker,
        scores: Vec::with_capacity(pairs.len() * iterations),
        abandoned: Vec::new(),
        written: Vec::new(),
    };

    for (kinase, module) in pairs {
        for _ in 0..iterations {
            let shuffled = shuffle_pwm(kinase, &mut rng);
            match divergence::score(&shuffled, module) {
                Ok(score) => partition.scores.push(NullScore {
                    score,
                    kinase: kinase.motif_id().to_string(),
                    module: module.motif_id().to_string(),
                }),
                Err(e) => {
                    warn!("Worker {}: abandoning shuffle iteration: {}", worker, e);
                    partition.abandoned.push(e);
                }
            }
        }
    }

    debug!(
        "Worker {} finished: {} null scores, {} abandoned",
        worker,
        partition.scores.len(),
        partition.abandoned.len()
    );

    if let Some(dir) = output_dir {
        partition.written = write_null_scores(partition_dir(dir, worker), &partition.scores)?;
    }
    Ok(partition)
}

/// Scores `config.iterations` independent shuffles of every kinase PWM
/// against every module PWM of the same width.
///
/// Work is split by iteration count over a pool of `config.workers`
/// threads. Each worker owns its generator and its partition; nothing is
/// shared while the pool runs. Pairs whose widths differ are not shuffled
/// and are reported in `NullRun::width_mismatches`.
///
/// With an `output_dir`, every worker writes its own scores under
/// `output_dir/worker_<n>/`, one file per kinase, before it returns.
pub fn generate_null_scores(
    kinases: &PwmCollection,
    modules: &PwmCollection,
    config: &ShuffleConfig,
    output_dir: Option<&Path>,
) -> Result<NullRun> {
    config.validate()?;

    let mut pairs = Vec::with_capacity(kinases.len() * modules.len());
    let mut width_mismatches = Vec::new();
    for kinase in kinases.values() {
        for module in modules.values() {
            if kinase.width() == module.width() {
                pairs.push((kinase, module));
            } else {
                let e = MotifError::WidthMismatch {
                    query: kinase.motif_id().to_string(),
                    comparison: module.motif_id().to_string(),
                    query_width: kinase.width(),
                    comparison_width: module.width(),
                };
                warn!("Not shuffling pair: {}", e);
                width_mismatches.push(e);
            }
        }
    }

    info!(
        "Shuffling {} kinase/module pair(s) x {} iteration(s) on {} worker(s)",
        pairs.len(),
        config.iterations,
        config.workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| MotifError::invalid_parameter("workers", config.workers, e.to_string()))?;

    let partitions = pool.install(|| {
        (0..config.workers)
            .into_par_iter()
            .map(|worker| run_worker(worker, &pairs, config, output_dir))
            .collect::<Result<Vec<WorkerPartition>>>()
    })?;

    Ok(NullRun {
        partitions,
        width_mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graded(id: &str, width: usize) -> Pwm {
        let mut m = Array2::zeros((20, width));
        for p in 0..width {
            let weights: Vec<f64> = (0..20).map(|r| (r + 1 + p) as f64).collect();
            let total: f64 = weights.iter().sum();
            for (r, w) in weights.iter().enumerate() {
                m[[r, p]] = w / total;
            }
        }
        Pwm::new(id, m).unwrap()
    }

    fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
        let mut v: Vec<f64> = values.into_iter().collect();
        v.sort_by(f64::total_cmp);
        v
    }

    #[test]
    fn residue_shuffle_keeps_column_multisets() {
        let pwm = graded("Hog1", 13);
        let mut shuffled = pwm.frequencies().to_owned();
        let mut rng = worker_rng(Some(11), 0);
        shuffle_residues(&mut shuffled, &mut rng);

        assert_ne!(shuffled, pwm.frequencies().to_owned());
        for p in 0..13 {
            assert_eq!(
                sorted(shuffled.column(p).iter().copied()),
                sorted(pwm.position(p).iter().copied())
            );
        }
    }

    #[test]
    fn position_shuffle_keeps_columns() {
        let pwm = graded("Hog1", 13);
        let mut rng = worker_rng(Some(3), 0);
        let reordered = shuffle_positions(&pwm.frequencies().to_owned(), &mut rng);

        let columns = |m: &Array2<f64>| {
            let mut cols: Vec<Vec<f64>> = m.axis_iter(Axis(1)).map(|c| c.to_vec()).collect();
            cols.sort_by(|a, b| a[0].total_cmp(&b[0]));
            cols
        };
        assert_eq!(columns(&reordered), columns(&pwm.frequencies().to_owned()));
    }

    #[test]
    fn shuffle_copies_and_keeps_id() {
        let pwm = graded("Hog1", 13);
        let before = pwm.clone();
        let mut rng = worker_rng(Some(5), 0);
        let a = shuffle_pwm(&pwm, &mut rng);
        let b = shuffle_pwm(&pwm, &mut rng);
        assert_eq!(pwm, before);
        assert_eq!(a.motif_id(), "Hog1");
        assert_ne!(a, b);
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let pwm = graded("Hog1", 13);
        let a = shuffle_pwm(&pwm, &mut worker_rng(Some(42), 1));
        let b = shuffle_pwm(&pwm, &mut worker_rng(Some(42), 1));
        assert_eq!(a, b);
    }

    #[test]
    fn generates_every_iteration() {
        let kinases: PwmCollection = [graded("Hog1", 5), graded("Cdc28", 5), graded("Short", 3)]
            .into_iter()
            .map(|p| (p.motif_id().to_string(), p))
            .collect();
        let modules: PwmCollection = [graded("M1", 5)]
            .into_iter()
            .map(|p| (p.motif_id().to_string(), p))
            .collect();
        let config = ShuffleConfig {
            iterations: 7,
            workers: 3,
            seed: Some(1),
        };

        let run = generate_null_scores(&kinases, &modules, &config, None).unwrap();
        assert_eq!(run.partitions.len(), 3);
        assert_eq!(run.score_count(), 2 * 7);
        assert_eq!(run.abandoned_count(), 0);
        assert_eq!(run.width_mismatches.len(), 1);
        let scores = run.into_scores();
        assert!(scores.iter().all(|s| s.module == "M1" && s.score >= 0.0));
        assert_eq!(scores.iter().filter(|s| s.kinase == "Hog1").count(), 7);
    }

    #[test]
    fn failed_scores_are_abandoned_not_dropped() {
        let mut m = graded("M1", 4).frequencies().to_owned();
        m[[0, 0]] = 0.0;
        let module = Pwm::new("M1", m).unwrap();
        let kinases: PwmCollection = [("Hog1".to_string(), graded("Hog1", 4))].into();
        let modules: PwmCollection = [("M1".to_string(), module)].into();
        let config = ShuffleConfig {
            iterations: 4,
            workers: 2,
            seed: Some(9),
        };

        let run = generate_null_scores(&kinases, &modules, &config, None).unwrap();
        assert_eq!(run.score_count(), 0);
        assert_eq!(run.abandoned_count(), 4);
        assert!(matches!(
            run.require_scores(),
            Err(MotifError::NothingScored(_))
        ));
    }

    #[test]
    fn workers_write_their_own_partitions() {
        let kinases: PwmCollection = [graded("Hog1", 5), graded("Cdc28", 5)]
            .into_iter()
            .map(|p| (p.motif_id().to_string(), p))
            .collect();
        let modules: PwmCollection = [("M1".to_string(), graded("M1", 5))].into();
        let config = ShuffleConfig {
            iterations: 5,
            workers: 2,
            seed: Some(8),
        };
        let dir = tempfile::tempdir().unwrap();

        let run = generate_null_scores(&kinases, &modules, &config, Some(dir.path())).unwrap();
        run.require_scores().unwrap();
        for partition in &run.partitions {
            assert_eq!(partition.written.len(), 2);
            let own_dir = partition_dir(dir.path(), partition.worker);
            assert!(partition.written.iter().all(|p| p.starts_with(&own_dir)));

            let mut reread = Vec::new();
            for path in &partition.written {
                reread.extend(crate::scores::read_null_scores(path).unwrap());
            }
            assert_eq!(reread.len(), partition.scores.len());
        }
        assert_eq!(run.written().len(), 4);
    }
}
