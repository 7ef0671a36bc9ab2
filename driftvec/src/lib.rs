//! Streaming skip-gram word embeddings with negative sampling.
//!
//! This crate trains word and context embeddings online: sentences are
//! consumed one at a time, the vocabulary keeps (exact or bounded-memory
//! approximate) frequency statistics as it drifts, and every (focus,
//! context) pair triggers a stochastic gradient step against a
//! noise-contrastive objective with negatives drawn from a pluggable
//! sampling strategy.

mod aligned;
pub use crate::aligned::{AlignedVec, ALIGNMENT, ALIGNMENT_LANES};

mod config;
pub use crate::config::{
    ContextConfig, ContextVariant, FactorizationConfig, LanguageModelVariant, LearnerConfig,
    SamplerConfig, SamplerVariant, SgdConfig, SgnsConfig, VocabConfig, DEFAULT_EMBEDDING_DIM,
    DEFAULT_NEG_SAMPLES, DEFAULT_SYMM_CONTEXT, DEFAULT_VOCAB_DIM,
};

mod context;
pub use crate::context::ContextStrategy;

mod error;
pub use crate::error::{Error, Result};

pub mod io;
pub use crate::io::{ReadModelBinary, Sentences, WriteModelBinary, MODEL_VERSION};

mod sampling;
pub use crate::sampling::{
    AliasSampler, CountNormalizer, ReservoirSampler, SamplingStrategy, DEFAULT_REFRESH_BURN_IN,
    DEFAULT_REFRESH_INTERVAL, DEFAULT_RESERVOIR_SIZE,
};

mod sgd;
pub use crate::sgd::{Sgd, DEFAULT_KAPPA};

mod sgns;
pub use crate::sgns::{SgnsSentenceLearner, SgnsTokenLearner, SubsamplingSgnsSentenceLearner};

mod train_model;
pub use crate::train_model::{ModelParts, SgnsModel, WordContextFactorization};

pub(crate) mod util;
pub use crate::util::{logistic, safe_ln, EOS};

pub mod vec_simd;

mod vocab;
pub use crate::vocab::{
    LanguageModel, NaiveLanguageModel, SpaceSavingLanguageModel, DEFAULT_SUBSAMPLE_THRESHOLD,
};
