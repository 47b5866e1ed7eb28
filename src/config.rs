use crate::error::{MotifError, Result};
use crate::pwm::DEFAULT_PSEUDOCOUNT;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shuffle iterations per (kinase, module) pair in the original workflow
pub const DEFAULT_ITERATIONS: usize = 1000;

/// Null distribution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleConfig {
    /// Shuffles drawn per (kinase, module) pair, split across workers
    pub iterations: usize,
    pub workers: usize,
    /// Fixed seed for reproducible runs; `None` seeds from system entropy
    pub seed: Option<u64>,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            workers: rayon::current_num_threads(),
            seed: None,
        }
    }
}

impl ShuffleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(MotifError::invalid_parameter(
                "iterations",
                self.iterations,
                "at least one shuffle is required",
            ));
        }
        if self.workers == 0 {
            return Err(MotifError::invalid_parameter(
                "workers",
                self.workers,
                "at least one worker is required",
            ));
        }
        Ok(())
    }

    /// Iterations assigned to `worker`; the remainder goes to the lowest indices
    pub fn iterations_for(&self, worker: usize) -> usize {
        let base = self.iterations / self.workers;
        let extra = usize::from(worker < self.iterations % self.workers);
        base + extra
    }
}

/// Settings for a whole scoring run, loadable from TOML
///
/// ```toml
/// pseudocount = 1.0
/// write_partitions = true
///
/// [shuffle]
/// iterations = 1000
/// workers = 8
/// seed = 42
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub shuffle: ShuffleConfig,
    /// Added to every cell when PWMs are built from peptides
    pub pseudocount: f64,
    /// Write each worker's null scores under its own sub-directory
    pub write_partitions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shuffle: ShuffleConfig::default(),
            pseudocount: DEFAULT_PSEUDOCOUNT,
            write_partitions: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.shuffle.validate()?;
        if !self.pseudocount.is_finite() || self.pseudocount < 0.0 {
            return Err(MotifError::invalid_parameter(
                "pseudocount",
                self.pseudocount,
                "must be a non-negative number",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml() {
        let config = PipelineConfig::from_str(
            r#"
            [shuffle]
            iterations = 50
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.shuffle.iterations, 50);
        assert_eq!(config.shuffle.seed, Some(7));
        assert_eq!(config.pseudocount, DEFAULT_PSEUDOCOUNT);
        assert!(config.write_partitions);
    }

    #[test]
    fn rejects_zero_workers() {
        let result = PipelineConfig::from_str("[shuffle]\nworkers = 0\n");
        assert!(matches!(result, Err(MotifError::InvalidParameter { .. })));
        assert!(matches!(
            PipelineConfig::from_str("pseudocount = \"one\""),
            Err(MotifError::Config(_))
        ));
    }

    #[test]
    fn splits_iterations_across_workers() {
        let config = ShuffleConfig {
            iterations: 10,
            workers: 3,
            seed: None,
        };
        let shares: Vec<usize> = (0..3).map(|w| config.iterations_for(w)).collect();
        assert_eq!(shares, vec![4, 3, 3]);
        assert_eq!(shares.iter().sum::<usize>(), 10);
    }
}
