use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sampling::{DEFAULT_REFRESH_BURN_IN, DEFAULT_REFRESH_INTERVAL, DEFAULT_RESERVOIR_SIZE};
use crate::sgd::DEFAULT_KAPPA;
use crate::vocab::DEFAULT_SUBSAMPLE_THRESHOLD;

/// Default maximum vocabulary, and the number of embedding rows.
pub const DEFAULT_VOCAB_DIM: usize = 16000;

/// Default embedding width.
pub const DEFAULT_EMBEDDING_DIM: usize = 200;

/// Default number of negative samples per context word.
pub const DEFAULT_NEG_SAMPLES: usize = 5;

/// Default symmetric context window.
pub const DEFAULT_SYMM_CONTEXT: usize = 5;

/// Language model variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageModelVariant {
    /// Exact counts, unbounded vocabulary.
    Naive,

    /// Space-saving approximate counts, bounded vocabulary.
    SpaceSaving,
}

/// Negative-sampling source variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerVariant {
    Uniform,
    Empirical,
    Reservoir,
}

/// Context window variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextVariant {
    Static,
    Dynamic,
}

/// Embedding matrix hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactorizationConfig {
    /// Number of embedding rows; also the capacity of a space-saving
    /// vocabulary.
    pub vocab_dim: usize,

    /// Embedding width.
    pub embedding_dim: usize,

    /// Pad each row to the SIMD alignment granule.
    pub align_each_embedding: bool,
}

impl Default for FactorizationConfig {
    fn default() -> Self {
        FactorizationConfig {
            vocab_dim: DEFAULT_VOCAB_DIM,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            align_each_embedding: true,
        }
    }
}

/// Step size schedule hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    /// Shift of the decay schedule.
    pub tau: f32,

    /// Decay exponent, in (0, 1].
    pub kappa: f32,

    /// Minimum step size.
    pub rho_lower_bound: f32,
}

impl Default for SgdConfig {
    fn default() -> Self {
        SgdConfig {
            tau: 0.0,
            kappa: DEFAULT_KAPPA,
            rho_lower_bound: 0.0,
        }
    }
}

/// Vocabulary hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocabConfig {
    pub variant: LanguageModelVariant,

    /// Frequent-word subsampling cutoff.
    pub subsample_threshold: f32,
}

impl Default for VocabConfig {
    fn default() -> Self {
        VocabConfig {
            variant: LanguageModelVariant::SpaceSaving,
            subsample_threshold: DEFAULT_SUBSAMPLE_THRESHOLD,
        }
    }
}

/// Negative-sampling hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub variant: SamplerVariant,

    /// Rebuild period of the empirical distribution.
    pub refresh_interval: usize,

    /// Number of initial steps during which the empirical distribution
    /// is rebuilt on every step.
    pub refresh_burn_in: usize,

    /// Count smoothing exponent.
    pub exponent: f32,

    /// Count smoothing offset.
    pub offset: f32,

    /// Reservoir capacity.
    pub reservoir_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            variant: SamplerVariant::Empirical,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_burn_in: DEFAULT_REFRESH_BURN_IN,
            exponent: 1.0,
            offset: 0.0,
            reservoir_size: DEFAULT_RESERVOIR_SIZE,
        }
    }
}

/// Context window hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    pub variant: ContextVariant,

    /// The number of preceding and succeeding tokens that are considered
    /// as context during training.
    pub symm_context: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            variant: ContextVariant::Dynamic,
            symm_context: DEFAULT_SYMM_CONTEXT,
        }
    }
}

/// Learner hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Number of negative samples per context word.
    pub neg_samples: usize,

    /// Whether `sentence_train` ingests its words into the vocabulary
    /// and sampler before training. Disable when the caller has already
    /// ingested the sentence.
    pub propagate_retained: bool,

    /// Whether words discarded by subsampling are still shown to the
    /// negative sampler.
    pub propagate_discarded: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig {
            neg_samples: DEFAULT_NEG_SAMPLES,
            propagate_retained: true,
            propagate_discarded: false,
        }
    }
}

/// The full training configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgnsConfig {
    pub factorization: FactorizationConfig,
    pub sgd: SgdConfig,
    pub vocab: VocabConfig,
    pub sampler: SamplerConfig,
    pub context: ContextConfig,
    pub learner: LearnerConfig,
}

impl SgnsConfig {
    /// Reject hyperparameters that cannot be trained with.
    pub fn validate(&self) -> Result<()> {
        if self.factorization.vocab_dim == 0 {
            return Err(Error::invalid_config("vocab_dim must be non-zero"));
        }
        if self.factorization.embedding_dim == 0 {
            return Err(Error::invalid_config("embedding_dim must be non-zero"));
        }
        if !self.vocab.subsample_threshold.is_finite() || self.vocab.subsample_threshold <= 0.0 {
            return Err(Error::invalid_config(format!(
                "subsample_threshold must be finite and positive, got {}",
                self.vocab.subsample_threshold
            )));
        }
        if self.sampler.variant == SamplerVariant::Empirical && self.sampler.refresh_interval == 0 {
            return Err(Error::invalid_config("refresh_interval must be non-zero"));
        }
        if self.sampler.variant == SamplerVariant::Reservoir && self.sampler.reservoir_size == 0 {
            return Err(Error::invalid_config("reservoir_size must be non-zero"));
        }
        if !self.sampler.exponent.is_finite()
            || !self.sampler.offset.is_finite()
            || self.sampler.offset < 0.0
        {
            return Err(Error::invalid_config(
                "count smoothing needs a finite exponent and non-negative offset",
            ));
        }
        if !self.sgd.tau.is_finite() || self.sgd.tau < 0.0 {
            return Err(Error::invalid_config("tau must be finite and non-negative"));
        }
        if !self.sgd.kappa.is_finite() || self.sgd.kappa <= 0.0 || self.sgd.kappa > 1.0 {
            return Err(Error::invalid_config("kappa must be in (0, 1]"));
        }
        if !self.sgd.rho_lower_bound.is_finite() || self.sgd.rho_lower_bound < 0.0 {
            return Err(Error::invalid_config(
                "rho_lower_bound must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SgnsConfig;

    #[test]
    fn default_config_is_valid() {
        SgnsConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut config = SgnsConfig::default();
        config.factorization.embedding_dim = 0;
        assert!(config.validate().is_err());

        let mut config = SgnsConfig::default();
        config.sgd.kappa = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = SgnsConfig::default();
        config.vocab.subsample_threshold = -1.0;
        assert!(config.validate().is_err());
    }
}
