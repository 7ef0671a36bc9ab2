use std::io::{Read, Write};

use log::info;
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};

use crate::aligned::{AlignedVec, ALIGNMENT_LANES};
use crate::config::{ContextVariant, LanguageModelVariant, SamplerVariant, SgnsConfig};
use crate::context::ContextStrategy;
use crate::error::{Error, Result};
use crate::io::{
    read_f32_vec, read_header, read_usize, write_f32_vec, write_header, write_usize,
    ReadModelBinary, WriteModelBinary,
};
use crate::sampling::{CountNormalizer, SamplingStrategy};
use crate::sgd::Sgd;
use crate::sgns::{SgnsSentenceLearner, SgnsTokenLearner, SubsamplingSgnsSentenceLearner};
use crate::vocab::{LanguageModel, NaiveLanguageModel, SpaceSavingLanguageModel};

/// Word and context embedding tables.
///
/// Two flat `vocab_dim x actual_embedding_dim` buffers in aligned
/// storage. When alignment is enabled the row stride is padded to the
/// SIMD granule; only the first `embedding_dim` entries of a row are
/// meaningful, the padding lanes stay zero.
///
/// Word rows are initialized uniformly in `[-0.5/dim, +0.5/dim)`
/// (the word2vec convention); context rows start at zero.
#[derive(Clone, Debug, PartialEq)]
pub struct WordContextFactorization {
    vocab_dim: usize,
    embedding_dim: usize,
    actual_embedding_dim: usize,
    word_embeddings: AlignedVec,
    context_embeddings: AlignedVec,
}

impl WordContextFactorization {
    pub fn new<R: Rng>(
        vocab_dim: usize,
        embedding_dim: usize,
        align_each_embedding: bool,
        rng: &mut R,
    ) -> Result<Self> {
        if vocab_dim == 0 || embedding_dim == 0 {
            return Err(Error::invalid_config(
                "embedding tables need non-zero dimensions",
            ));
        }

        let actual_embedding_dim = if align_each_embedding {
            embedding_dim.div_ceil(ALIGNMENT_LANES) * ALIGNMENT_LANES
        } else {
            embedding_dim
        };

        let mut factorization = WordContextFactorization {
            vocab_dim,
            embedding_dim,
            actual_embedding_dim,
            word_embeddings: AlignedVec::zeros(vocab_dim * actual_embedding_dim),
            context_embeddings: AlignedVec::zeros(vocab_dim * actual_embedding_dim),
        };
        for word_idx in 0..vocab_dim {
            factorization.init_word_row(word_idx, rng);
        }

        Ok(factorization)
    }

    pub fn get_vocab_dim(&self) -> usize {
        self.vocab_dim
    }

    pub fn get_embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn actual_embedding_dim(&self) -> usize {
        self.actual_embedding_dim
    }

    /// Get the word embedding for an index.
    ///
    /// Panics if `word_idx >= vocab_dim`.
    pub fn get_word_embedding(&self, word_idx: usize) -> &[f32] {
        let start = word_idx * self.actual_embedding_dim;
        &self.word_embeddings[start..start + self.embedding_dim]
    }

    pub fn get_word_embedding_mut(&mut self, word_idx: usize) -> &mut [f32] {
        let start = word_idx * self.actual_embedding_dim;
        &mut self.word_embeddings[start..start + self.embedding_dim]
    }

    /// Get the context embedding for an index.
    ///
    /// Panics if `word_idx >= vocab_dim`.
    pub fn get_context_embedding(&self, word_idx: usize) -> &[f32] {
        let start = word_idx * self.actual_embedding_dim;
        &self.context_embeddings[start..start + self.embedding_dim]
    }

    pub fn get_context_embedding_mut(&mut self, word_idx: usize) -> &mut [f32] {
        let start = word_idx * self.actual_embedding_dim;
        &mut self.context_embeddings[start..start + self.embedding_dim]
    }

    /// Borrow a word row and a context row at the same time, for updates
    /// that read one while writing the other.
    pub fn word_and_context_mut(
        &mut self,
        word_idx: usize,
        context_idx: usize,
    ) -> (&[f32], &mut [f32]) {
        let word_start = word_idx * self.actual_embedding_dim;
        let context_start = context_idx * self.actual_embedding_dim;
        (
            &self.word_embeddings[word_start..word_start + self.embedding_dim],
            &mut self.context_embeddings[context_start..context_start + self.embedding_dim],
        )
    }

    /// Re-initialize a word row with fresh uniform values.
    pub(crate) fn init_word_row<R: Rng>(&mut self, word_idx: usize, rng: &mut R) {
        let bound = 0.5 / self.embedding_dim as f32;
        let distribution = Uniform::new(-bound, bound);
        for value in self.get_word_embedding_mut(word_idx) {
            *value = distribution.sample(rng);
        }
    }
}

impl<W> WriteModelBinary<W> for WordContextFactorization
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_usize(write, self.vocab_dim)?;
        write_usize(write, self.embedding_dim)?;
        write_usize(write, self.actual_embedding_dim)?;
        write_f32_vec(write, &self.word_embeddings)?;
        write_f32_vec(write, &self.context_embeddings)?;
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for WordContextFactorization
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        let vocab_dim = read_usize(read)?;
        let embedding_dim = read_usize(read)?;
        let actual_embedding_dim = read_usize(read)?;
        if vocab_dim == 0 || embedding_dim == 0 || actual_embedding_dim < embedding_dim {
            return Err(Error::deserialize("inconsistent embedding dimensions"));
        }
        let word_embeddings = read_f32_vec(read)?;
        let context_embeddings = read_f32_vec(read)?;
        let expected = vocab_dim * actual_embedding_dim;
        if word_embeddings.len() != expected || context_embeddings.len() != expected {
            return Err(Error::deserialize("embedding table size mismatch"));
        }
        Ok(WordContextFactorization {
            vocab_dim,
            embedding_dim,
            actual_embedding_dim,
            word_embeddings: AlignedVec::from_slice(&word_embeddings),
            context_embeddings: AlignedVec::from_slice(&context_embeddings),
        })
    }
}

/// The non-learner state of a model.
///
/// Learner methods borrow this state explicitly per call, so learners
/// hold no reference back into the model and the composite can be moved
/// freely.
#[derive(Debug)]
pub struct ModelParts<R> {
    pub factorization: WordContextFactorization,
    pub neg_sampler: SamplingStrategy<R>,
    pub language_model: LanguageModel,
    pub sgd: Sgd,
    pub ctx_strategy: ContextStrategy<R>,
    pub rng: R,
}

impl<R> PartialEq for ModelParts<R> {
    fn eq(&self, other: &Self) -> bool {
        self.factorization == other.factorization
            && self.neg_sampler == other.neg_sampler
            && self.language_model == other.language_model
            && self.sgd == other.sgd
            && self.ctx_strategy == other.ctx_strategy
    }
}

/// A complete SGNS training model.
///
/// Owns the factorization, the vocabulary, the negative sampler, the
/// SGD state, the context strategy, and the learners that drive them.
#[derive(Debug)]
pub struct SgnsModel<R> {
    parts: ModelParts<R>,
    token_learner: SgnsTokenLearner,
    sentence_learner: SgnsSentenceLearner,
    subsampling_learner: SubsamplingSgnsSentenceLearner,
}

impl<R> PartialEq for SgnsModel<R> {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
            && self.token_learner == other.token_learner
            && self.sentence_learner == other.sentence_learner
            && self.subsampling_learner == other.subsampling_learner
    }
}

impl<R> SgnsModel<R>
where
    R: Rng,
{
    /// Assemble a model from its components.
    pub fn from_parts(
        parts: ModelParts<R>,
        token_learner: SgnsTokenLearner,
        sentence_learner: SgnsSentenceLearner,
        subsampling_learner: SubsamplingSgnsSentenceLearner,
    ) -> Self {
        SgnsModel {
            parts,
            token_learner,
            sentence_learner,
            subsampling_learner,
        }
    }

    pub fn parts(&self) -> &ModelParts<R> {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut ModelParts<R> {
        &mut self.parts
    }

    pub fn language_model(&self) -> &LanguageModel {
        &self.parts.language_model
    }

    pub fn factorization(&self) -> &WordContextFactorization {
        &self.parts.factorization
    }

    pub fn sgd(&self) -> &Sgd {
        &self.parts.sgd
    }

    pub fn token_learner(&self) -> &SgnsTokenLearner {
        &self.token_learner
    }

    /// Ingest a single word without training.
    pub fn increment(&mut self, word: &str) -> Result<()> {
        let SgnsModel {
            parts,
            token_learner,
            sentence_learner,
            ..
        } = self;
        sentence_learner.increment(parts, token_learner, word)
    }

    /// Train on one sentence.
    pub fn sentence_train<S: AsRef<str>>(&mut self, words: &[S]) -> Result<()> {
        let SgnsModel {
            parts,
            token_learner,
            sentence_learner,
            ..
        } = self;
        sentence_learner.sentence_train(parts, token_learner, words)
    }

    /// Train on one sentence, dropping frequent words first.
    pub fn subsampling_sentence_train<S: AsRef<str>>(&mut self, words: &[S]) -> Result<()> {
        let SgnsModel {
            parts,
            token_learner,
            sentence_learner,
            subsampling_learner,
        } = self;
        subsampling_learner.sentence_train(parts, token_learner, sentence_learner, words)
    }

    /// Cosine similarity between two word embeddings.
    pub fn compute_similarity(&self, word1_idx: usize, word2_idx: usize) -> f32 {
        self.token_learner
            .compute_similarity(&self.parts, word1_idx, word2_idx)
    }

    /// Index of the nearest neighbor of a word, by cosine similarity.
    pub fn find_nearest_neighbor_idx(&self, word_idx: usize) -> Option<usize> {
        self.token_learner
            .find_nearest_neighbor_idx(&self.parts, word_idx)
    }

    /// The word that best predicts the given context.
    pub fn find_context_nearest_neighbor_idx(
        &self,
        left_context: usize,
        right_context: usize,
        word_ids: &[Option<usize>],
    ) -> Option<usize> {
        self.token_learner.find_context_nearest_neighbor_idx(
            &self.parts,
            left_context,
            right_context,
            word_ids,
        )
    }
}

impl<R> SgnsModel<R>
where
    R: Rng + SeedableRng,
{
    /// Build a model from a configuration.
    ///
    /// Stochastic components are handed RNGs derived from `rng`, so a
    /// fixed seed and a fixed input stream give a deterministic run.
    pub fn from_config(config: &SgnsConfig, mut rng: R) -> Result<Self> {
        config.validate()?;

        let factorization = WordContextFactorization::new(
            config.factorization.vocab_dim,
            config.factorization.embedding_dim,
            config.factorization.align_each_embedding,
            &mut rng,
        )?;

        let language_model = match config.vocab.variant {
            LanguageModelVariant::Naive => {
                LanguageModel::Naive(NaiveLanguageModel::new(config.vocab.subsample_threshold))
            }
            LanguageModelVariant::SpaceSaving => {
                LanguageModel::SpaceSaving(SpaceSavingLanguageModel::new(
                    config.factorization.vocab_dim,
                    config.vocab.subsample_threshold,
                )?)
            }
        };

        let neg_sampler = match config.sampler.variant {
            SamplerVariant::Uniform => {
                SamplingStrategy::uniform(R::seed_from_u64(rng.gen()))
            }
            SamplerVariant::Empirical => SamplingStrategy::empirical(
                CountNormalizer::new(config.sampler.exponent, config.sampler.offset)?,
                config.sampler.refresh_interval,
                config.sampler.refresh_burn_in,
                R::seed_from_u64(rng.gen()),
            )?,
            SamplerVariant::Reservoir => SamplingStrategy::reservoir(
                config.sampler.reservoir_size,
                R::seed_from_u64(rng.gen()),
            )?,
        };

        let ctx_strategy = match config.context.variant {
            ContextVariant::Static => ContextStrategy::fixed(config.context.symm_context),
            ContextVariant::Dynamic => {
                ContextStrategy::dynamic(config.context.symm_context, R::seed_from_u64(rng.gen()))
            }
        };

        let sgd = Sgd::new(
            1,
            config.sgd.tau,
            config.sgd.kappa,
            config.sgd.rho_lower_bound,
        )?;

        info!(
            "initialized model: {} x {} embeddings, {:?} vocabulary, {:?} negative sampling",
            config.factorization.vocab_dim,
            config.factorization.embedding_dim,
            config.vocab.variant,
            config.sampler.variant,
        );

        Ok(SgnsModel {
            parts: ModelParts {
                factorization,
                neg_sampler,
                language_model,
                sgd,
                ctx_strategy,
                rng,
            },
            token_learner: SgnsTokenLearner::new(),
            sentence_learner: SgnsSentenceLearner::new(
                config.learner.neg_samples,
                config.learner.propagate_retained,
            ),
            subsampling_learner: SubsamplingSgnsSentenceLearner::new(
                config.learner.propagate_discarded,
            ),
        })
    }
}

impl<W, R> WriteModelBinary<W> for SgnsModel<R>
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_header(write)?;
        self.parts.factorization.write_model_binary(write)?;
        self.parts.neg_sampler.write_model_binary(write)?;
        self.parts.language_model.write_model_binary(write)?;
        self.parts.sgd.write_model_binary(write)?;
        self.parts.ctx_strategy.write_model_binary(write)?;
        self.sentence_learner.write_model_binary(write)?;
        self.subsampling_learner.write_model_binary(write)?;
        Ok(())
    }
}

impl<RD, R> ReadModelBinary<RD> for SgnsModel<R>
where
    RD: Read,
    R: Rng + SeedableRng,
{
    fn read_model_binary(read: &mut RD) -> Result<Self> {
        read_header(read)?;
        let factorization = WordContextFactorization::read_model_binary(read)?;
        let neg_sampler = SamplingStrategy::read_model_binary(read)?;
        let language_model = LanguageModel::read_model_binary(read)?;
        let sgd = Sgd::read_model_binary(read)?;
        let ctx_strategy = ContextStrategy::read_model_binary(read)?;
        let sentence_learner = SgnsSentenceLearner::read_model_binary(read)?;
        let subsampling_learner = SubsamplingSgnsSentenceLearner::read_model_binary(read)?;

        Ok(SgnsModel {
            parts: ModelParts {
                factorization,
                neg_sampler,
                language_model,
                sgd,
                ctx_strategy,
                rng: R::from_entropy(),
            },
            token_learner: SgnsTokenLearner::new(),
            sentence_learner,
            subsampling_learner,
        })
    }
}
