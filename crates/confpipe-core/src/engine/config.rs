use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },
}

/// Parameters of the per-molecule conformer search.
///
/// All values arrive through the builder; the engine never reads global state.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Upper bound on the number of trial embeddings; the actual request is
    /// `min(3^rotatable_bonds, max_n_conf)`.
    pub max_n_conf: usize,
    /// Embedding attempt budget shared across all trials of one molecule.
    pub max_embed_attempts: usize,
    /// Heavy-atom RMSD below which a freshly embedded geometry is rejected
    /// as a duplicate of an already-accepted one.
    pub prune_rms_threshold: f64,
    /// Energy window as a fraction of |minimum energy|.
    pub energy_window_fraction: f64,
    /// Heavy-atom RMSD threshold of the post-relaxation deduplicator.
    pub dedup_rms_threshold: f64,
    /// Number of lowest-energy conformers persisted per molecule.
    pub num_confs_to_keep: usize,
    /// RNG seed; a fixed seed makes a full search run reproducible.
    pub seed: u64,
}

#[derive(Default)]
pub struct SearchConfigBuilder {
    max_n_conf: Option<usize>,
    max_embed_attempts: Option<usize>,
    prune_rms_threshold: Option<f64>,
    energy_window_fraction: Option<f64>,
    dedup_rms_threshold: Option<f64>,
    num_confs_to_keep: Option<usize>,
    seed: Option<u64>,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_n_conf(mut self, n: usize) -> Self {
        self.max_n_conf = Some(n);
        self
    }
    pub fn max_embed_attempts(mut self, n: usize) -> Self {
        self.max_embed_attempts = Some(n);
        self
    }
    pub fn prune_rms_threshold(mut self, threshold: f64) -> Self {
        self.prune_rms_threshold = Some(threshold);
        self
    }
    pub fn energy_window_fraction(mut self, fraction: f64) -> Self {
        self.energy_window_fraction = Some(fraction);
        self
    }
    pub fn dedup_rms_threshold(mut self, threshold: f64) -> Self {
        self.dedup_rms_threshold = Some(threshold);
        self
    }
    pub fn num_confs_to_keep(mut self, n: usize) -> Self {
        self.num_confs_to_keep = Some(n);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<SearchConfig, ConfigError> {
        let config = SearchConfig {
            max_n_conf: self
                .max_n_conf
                .ok_or(ConfigError::MissingParameter("max_n_conf"))?,
            max_embed_attempts: self
                .max_embed_attempts
                .ok_or(ConfigError::MissingParameter("max_embed_attempts"))?,
            prune_rms_threshold: self
                .prune_rms_threshold
                .ok_or(ConfigError::MissingParameter("prune_rms_threshold"))?,
            energy_window_fraction: self
                .energy_window_fraction
                .ok_or(ConfigError::MissingParameter("energy_window_fraction"))?,
            dedup_rms_threshold: self
                .dedup_rms_threshold
                .ok_or(ConfigError::MissingParameter("dedup_rms_threshold"))?,
            num_confs_to_keep: self
                .num_confs_to_keep
                .ok_or(ConfigError::MissingParameter("num_confs_to_keep"))?,
            seed: self.seed.ok_or(ConfigError::MissingParameter("seed"))?,
        };

        if config.max_n_conf == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_n_conf",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.max_embed_attempts == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_embed_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.num_confs_to_keep == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "num_confs_to_keep",
                reason: "must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("prune_rms_threshold", config.prune_rms_threshold),
            ("energy_window_fraction", config.energy_window_fraction),
            ("dedup_rms_threshold", config.dedup_rms_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("must be a non-negative finite number, got {value}"),
                });
            }
        }

        Ok(config)
    }
}

/// Compute budget handed to every backend invocation of one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageResources {
    pub procs: usize,
    pub memory_mb: usize,
    /// Wall-clock limit per backend call.
    pub timeout: Duration,
}

impl Default for StageResources {
    fn default() -> Self {
        Self {
            procs: 1,
            memory_mb: 1000,
            timeout: Duration::from_secs(7200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
            .max_n_conf(800)
            .max_embed_attempts(2000)
            .prune_rms_threshold(0.1)
            .energy_window_fraction(0.2)
            .dedup_rms_threshold(0.4)
            .num_confs_to_keep(10)
            .seed(1)
    }

    #[test]
    fn builds_with_all_parameters() {
        let config = complete_builder().build().unwrap();
        assert_eq!(config.max_n_conf, 800);
        assert_eq!(config.seed, 1);
    }

    #[test]
    fn missing_parameters_are_named() {
        let result = SearchConfigBuilder::new().max_n_conf(10).build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingParameter("max_embed_attempts")
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            complete_builder().max_n_conf(0).build(),
            Err(ConfigError::InvalidParameter {
                name: "max_n_conf",
                ..
            })
        ));
        assert!(matches!(
            complete_builder().energy_window_fraction(-0.5).build(),
            Err(ConfigError::InvalidParameter {
                name: "energy_window_fraction",
                ..
            })
        ));
        assert!(matches!(
            complete_builder().dedup_rms_threshold(f64::NAN).build(),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }
}
