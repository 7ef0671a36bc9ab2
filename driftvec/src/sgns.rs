use std::io::{Read, Write};

use rand::Rng;

use crate::error::{Error, Result};
use crate::io::{read_bool, read_usize, write_bool, write_usize, ReadModelBinary, WriteModelBinary};
use crate::train_model::ModelParts;
use crate::util::{logistic, safe_ln};
use crate::vec_simd::{dot, norm, scaled_add};

/// Core SGNS update. Trains on a single (target, context) word pair with
/// a number of negative samples. Usually driven through
/// [`SgnsSentenceLearner`] rather than called directly.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SgnsTokenLearner;

impl SgnsTokenLearner {
    pub fn new() -> Self {
        SgnsTokenLearner
    }

    /// Re-initialize the training state of a word index: fresh random
    /// word embedding, zeroed context embedding, rewound step size.
    ///
    /// Called when a vocabulary slot is recycled, so the new occupant
    /// does not inherit the evicted word's position in embedding space.
    pub fn reset_word<R: Rng>(&self, parts: &mut ModelParts<R>, word_idx: usize) {
        parts.factorization.init_word_row(word_idx, &mut parts.rng);
        for value in parts.factorization.get_context_embedding_mut(word_idx) {
            *value = 0.0;
        }
        parts.sgd.reset(0);
    }

    /// One gradient step on a (target, context) pair with `neg_samples`
    /// negatives drawn from the sampling strategy.
    pub fn token_train<R: Rng>(
        &self,
        parts: &mut ModelParts<R>,
        target_word_idx: usize,
        context_word_idx: usize,
        neg_samples: usize,
    ) -> Result<()> {
        let vocab_dim = parts.factorization.get_vocab_dim();
        if target_word_idx >= vocab_dim {
            return Err(Error::out_of_range(target_word_idx, vocab_dim));
        }
        if context_word_idx >= vocab_dim {
            return Err(Error::out_of_range(context_word_idx, vocab_dim));
        }

        let mut word_gradient = vec![0f32; parts.factorization.get_embedding_dim()];

        // Positive example: pull the context row towards the target row,
        // accumulating the target's own update for later.
        let coeff = self.compute_gradient_coeff(parts, target_word_idx, context_word_idx, false);
        let (word, context) = parts
            .factorization
            .word_and_context_mut(target_word_idx, context_word_idx);
        scaled_add(&mut word_gradient, context, coeff);
        parts.sgd.scaled_gradient_update(0, word, context, coeff);

        // Negative examples. The sampler may draw the target itself; the
        // update still pushes the pair apart, as in word2vec.
        for _ in 0..neg_samples {
            let neg_word_idx = parts.neg_sampler.sample_idx(&parts.language_model)?;
            if neg_word_idx >= vocab_dim {
                return Err(Error::out_of_range(neg_word_idx, vocab_dim));
            }
            let coeff = self.compute_gradient_coeff(parts, target_word_idx, neg_word_idx, true);
            let (word, context) = parts
                .factorization
                .word_and_context_mut(target_word_idx, neg_word_idx);
            scaled_add(&mut word_gradient, context, coeff);
            parts.sgd.scaled_gradient_update(0, word, context, coeff);
        }

        // Apply the accumulated gradient to the target row.
        parts.sgd.gradient_update(
            0,
            &word_gradient,
            parts.factorization.get_word_embedding_mut(target_word_idx),
        );
        parts.sgd.step(0);

        Ok(())
    }

    /// Gradient coefficient for a pair: the predicted probability minus
    /// the label (1 for an observed pair, 0 for a negative sample).
    pub fn compute_gradient_coeff<R>(
        &self,
        parts: &ModelParts<R>,
        target_word_idx: usize,
        context_word_idx: usize,
        negative_sample: bool,
    ) -> f32 {
        let word = parts.factorization.get_word_embedding(target_word_idx);
        let context = parts.factorization.get_context_embedding(context_word_idx);
        let label = if negative_sample { 0.0 } else { 1.0 };
        logistic(dot(word, context)) - label
    }

    /// Cosine similarity between two word embeddings.
    pub fn compute_similarity<R>(
        &self,
        parts: &ModelParts<R>,
        word1_idx: usize,
        word2_idx: usize,
    ) -> f32 {
        let word1 = parts.factorization.get_word_embedding(word1_idx);
        let word2 = parts.factorization.get_word_embedding(word2_idx);
        dot(word1, word2) / (norm(word1) * norm(word2))
    }

    /// The other word whose embedding is closest by cosine similarity.
    ///
    /// Ties go to the smaller index.
    pub fn find_nearest_neighbor_idx<R>(
        &self,
        parts: &ModelParts<R>,
        word_idx: usize,
    ) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for candidate in 0..parts.language_model.size() {
            if candidate == word_idx {
                continue;
            }
            let similarity = self.compute_similarity(parts, word_idx, candidate);
            if best.map_or(true, |(_, best_similarity)| similarity > best_similarity) {
                best = Some((candidate, similarity));
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    /// The word that best predicts the given context under the model.
    ///
    /// `word_ids` holds `left_context + right_context + 1` resolved
    /// indices, with the position to fill at `left_context`; that hole
    /// and unresolved (`None`) positions are ignored. Ties go to the
    /// smaller index.
    pub fn find_context_nearest_neighbor_idx<R>(
        &self,
        parts: &ModelParts<R>,
        left_context: usize,
        right_context: usize,
        word_ids: &[Option<usize>],
    ) -> Option<usize> {
        debug_assert_eq!(word_ids.len(), left_context + right_context + 1);

        let mut best: Option<(usize, f32)> = None;
        for candidate in 0..parts.language_model.size() {
            let word = parts.factorization.get_word_embedding(candidate);
            let mut score = 0.0;
            for (position, word_id) in word_ids.iter().enumerate() {
                if position == left_context {
                    continue;
                }
                if let Some(context_idx) = word_id {
                    let context = parts.factorization.get_context_embedding(*context_idx);
                    score += safe_ln(logistic(dot(word, context)));
                }
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    /// True iff any of the ids is unresolved.
    pub fn context_contains_oov(&self, ctx_word_ids: &[Option<usize>]) -> bool {
        ctx_word_ids.iter().any(Option::is_none)
    }
}

impl<W> WriteModelBinary<W> for SgnsTokenLearner
where
    W: Write,
{
    fn write_model_binary(&self, _write: &mut W) -> Result<()> {
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for SgnsTokenLearner
where
    R: Read,
{
    fn read_model_binary(_read: &mut R) -> Result<Self> {
        Ok(SgnsTokenLearner)
    }
}

/// Drives the token learner over the overlapping contexts of a
/// sentence, keeping the vocabulary and the negative sampler fed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SgnsSentenceLearner {
    neg_samples: usize,
    propagate_retained: bool,
}

impl SgnsSentenceLearner {
    pub fn new(neg_samples: usize, propagate_retained: bool) -> Self {
        SgnsSentenceLearner {
            neg_samples,
            propagate_retained,
        }
    }

    pub fn neg_samples(&self) -> usize {
        self.neg_samples
    }

    /// Ingest one word: count it, recycle any evicted slot, and show the
    /// observation to the negative sampler.
    pub fn increment<R: Rng>(
        &self,
        parts: &mut ModelParts<R>,
        token_learner: &SgnsTokenLearner,
        word: &str,
    ) -> Result<()> {
        if let Some((ejected_idx, _ejected_word)) = parts.language_model.increment(word) {
            if ejected_idx < parts.factorization.get_vocab_dim() {
                token_learner.reset_word(parts, ejected_idx);
            }
        }
        if let Some(word_idx) = parts.language_model.lookup(word) {
            parts.neg_sampler.step(&parts.language_model, word_idx);
        }
        Ok(())
    }

    /// Train on one sentence.
    ///
    /// When `propagate_retained` is set the sentence is first ingested
    /// word by word; a caller that has already ingested (such as the
    /// subsampling wrapper) leaves it unset to avoid double counting.
    /// Positions whose word got evicted between ingest and training are
    /// skipped.
    pub fn sentence_train<R: Rng, S: AsRef<str>>(
        &self,
        parts: &mut ModelParts<R>,
        token_learner: &SgnsTokenLearner,
        words: &[S],
    ) -> Result<()> {
        if self.propagate_retained {
            for word in words {
                self.increment(parts, token_learner, word.as_ref())?;
            }
        }
        self.train_resolved(parts, token_learner, words)
    }

    /// The training phase alone: resolve indices, then train every
    /// (focus, context) pair inside the strategy-chosen windows.
    pub(crate) fn train_resolved<R: Rng, S: AsRef<str>>(
        &self,
        parts: &mut ModelParts<R>,
        token_learner: &SgnsTokenLearner,
        words: &[S],
    ) -> Result<()> {
        let word_ids: Vec<Option<usize>> = words
            .iter()
            .map(|word| parts.language_model.lookup(word.as_ref()))
            .collect();

        for focus in 0..word_ids.len() {
            let target_idx = match word_ids[focus] {
                Some(idx) => idx,
                None => continue,
            };

            let (left, right) = parts
                .ctx_strategy
                .size(focus, word_ids.len() - 1 - focus);
            for position in focus - left..=focus + right {
                if position == focus {
                    continue;
                }
                if let Some(context_idx) = word_ids[position] {
                    token_learner.token_train(parts, target_idx, context_idx, self.neg_samples)?;
                }
            }
        }

        Ok(())
    }
}

impl<W> WriteModelBinary<W> for SgnsSentenceLearner
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_usize(write, self.neg_samples)?;
        write_bool(write, self.propagate_retained)?;
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for SgnsSentenceLearner
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        let neg_samples = read_usize(read)?;
        let propagate_retained = read_bool(read)?;
        Ok(SgnsSentenceLearner {
            neg_samples,
            propagate_retained,
        })
    }
}

/// Drops frequent words from sentences before delegating to an inner
/// sentence learner, as in word2vec.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubsamplingSgnsSentenceLearner {
    propagate_discarded: bool,
}

impl SubsamplingSgnsSentenceLearner {
    pub fn new(propagate_discarded: bool) -> Self {
        SubsamplingSgnsSentenceLearner {
            propagate_discarded,
        }
    }

    /// Ingest every word, subsample, then train on the kept words.
    ///
    /// Ingestion happens exactly once, here; the inner learner's training
    /// phase is invoked directly so sentence words are never counted
    /// twice. Words discarded by subsampling can still be shown to the
    /// negative sampler via `propagate_discarded`.
    pub fn sentence_train<R: Rng, S: AsRef<str>>(
        &self,
        parts: &mut ModelParts<R>,
        token_learner: &SgnsTokenLearner,
        sentence_learner: &SgnsSentenceLearner,
        words: &[S],
    ) -> Result<()> {
        let mut kept: Vec<&str> = Vec::with_capacity(words.len());
        for word in words {
            let word = word.as_ref();
            sentence_learner.increment(parts, token_learner, word)?;
            let word_idx = match parts.language_model.lookup(word) {
                Some(idx) => idx,
                None => continue,
            };
            if parts.language_model.subsample(word_idx, &mut parts.rng)? {
                kept.push(word);
            } else if self.propagate_discarded {
                parts.neg_sampler.step(&parts.language_model, word_idx);
            }
        }

        sentence_learner.train_resolved(parts, token_learner, &kept)
    }
}

impl<W> WriteModelBinary<W> for SubsamplingSgnsSentenceLearner
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_bool(write, self.propagate_discarded)?;
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for SubsamplingSgnsSentenceLearner
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        Ok(SubsamplingSgnsSentenceLearner {
            propagate_discarded: read_bool(read)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use crate::config::{ContextVariant, LanguageModelVariant, SamplerVariant, SgnsConfig};
    use crate::train_model::SgnsModel;
    use crate::util::close;

    const SEED: [u8; 16] = [
        0xc8, 0xae, 0xa3, 0x99, 0x28, 0x5a, 0xbb, 0x27, 0x90, 0xe9, 0x61, 0x60, 0xe5, 0xca, 0xfe,
        0x22,
    ];

    fn small_config() -> SgnsConfig {
        let mut config = SgnsConfig::default();
        config.factorization.vocab_dim = 6;
        config.factorization.embedding_dim = 8;
        config.vocab.variant = LanguageModelVariant::Naive;
        config.sampler.variant = SamplerVariant::Uniform;
        config.context.variant = ContextVariant::Static;
        config.context.symm_context = 2;
        config.learner.neg_samples = 2;
        config
    }

    fn small_model() -> SgnsModel<XorShiftRng> {
        SgnsModel::from_config(&small_config(), XorShiftRng::from_seed(SEED)).unwrap()
    }

    #[test]
    fn zero_pair_stays_zero() {
        let mut model = small_model();
        model.increment("a").unwrap();
        model.increment("b").unwrap();

        let parts = model.parts_mut();
        for value in parts.factorization.get_word_embedding_mut(0) {
            *value = 0.0;
        }

        let token_learner = *model.token_learner();
        token_learner
            .token_train(model.parts_mut(), 0, 1, 0)
            .unwrap();

        // A zero target row produces a zero gradient on both sides.
        assert!(model
            .factorization()
            .get_word_embedding(0)
            .iter()
            .all(|&v| v == 0.0));
        assert!(model
            .factorization()
            .get_context_embedding(1)
            .iter()
            .all(|&v| v == 0.0));
    }

    #[test]
    fn token_train_updates_both_tables() {
        let mut config = small_config();
        config.sgd.tau = 1.0;
        let mut model: SgnsModel<XorShiftRng> =
            SgnsModel::from_config(&config, XorShiftRng::from_seed(SEED)).unwrap();
        model.increment("a").unwrap();
        model.increment("b").unwrap();

        let word_before = model.factorization().get_word_embedding(0).to_vec();

        let token_learner = *model.token_learner();
        token_learner
            .token_train(model.parts_mut(), 0, 1, 2)
            .unwrap();

        // The positive context row moves along the target row.
        assert!(model
            .factorization()
            .get_context_embedding(1)
            .iter()
            .any(|&v| v != 0.0));
        assert!(model
            .factorization()
            .get_word_embedding(0)
            .iter()
            .zip(&word_before)
            .any(|(&after, &before)| after != before));
        // The step counter advanced exactly once: rho = (1 + 1)^-0.6.
        assert!(close(model.sgd().get_rho(0), 2f32.powf(-0.6), 1e-6));
    }

    #[test]
    fn gradient_coeff_is_probability_minus_label() {
        let mut model = small_model();
        model.increment("a").unwrap();
        model.increment("b").unwrap();
        let parts = model.parts_mut();
        for value in parts.factorization.get_word_embedding_mut(0) {
            *value = 0.0;
        }

        let token_learner = *model.token_learner();
        // Zero inner product predicts 0.5 either way.
        assert!(close(
            token_learner.compute_gradient_coeff(model.parts(), 0, 1, false),
            -0.5,
            1e-6
        ));
        assert!(close(
            token_learner.compute_gradient_coeff(model.parts(), 0, 1, true),
            0.5,
            1e-6
        ));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut model = small_model();
        model.increment("a").unwrap();
        let token_learner = *model.token_learner();
        assert!(token_learner
            .token_train(model.parts_mut(), 6, 0, 0)
            .is_err());
        assert!(token_learner
            .token_train(model.parts_mut(), 0, 99, 0)
            .is_err());
    }

    #[test]
    fn self_similarity_is_one() {
        let model = small_model();
        for word_idx in 0..3 {
            assert!(close(model.compute_similarity(word_idx, word_idx), 1.0, 1e-5));
        }
    }

    #[test]
    fn nearest_neighbor_prefers_aligned_rows() {
        let mut model = small_model();
        for word in ["a", "b", "c"] {
            model.increment(word).unwrap();
        }

        let parts = model.parts_mut();
        let rows: [&[f32]; 3] = [
            &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[0.9, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        for (word_idx, row) in rows.iter().enumerate() {
            parts
                .factorization
                .get_word_embedding_mut(word_idx)
                .copy_from_slice(row);
        }

        assert_eq!(model.find_nearest_neighbor_idx(0), Some(1));
        assert_eq!(model.find_nearest_neighbor_idx(2), Some(1));
    }

    #[test]
    fn context_nearest_neighbor_maximizes_log_likelihood() {
        let mut model = small_model();
        for word in ["a", "b", "c"] {
            model.increment(word).unwrap();
        }

        let parts = model.parts_mut();
        let dim = parts.factorization.get_embedding_dim();
        let mut unit = vec![0.0; dim];
        unit[0] = 1.0;
        for context_idx in [0, 2] {
            parts
                .factorization
                .get_context_embedding_mut(context_idx)
                .copy_from_slice(&unit);
        }
        let mut word_rows = vec![vec![0.0; dim], vec![0.0; dim], vec![0.0; dim]];
        word_rows[0][0] = 1.0;
        word_rows[1][0] = 2.0;
        word_rows[2][0] = -1.0;
        for (word_idx, row) in word_rows.iter().enumerate() {
            parts
                .factorization
                .get_word_embedding_mut(word_idx)
                .copy_from_slice(row);
        }

        // Candidate 1 has the largest inner product with both context
        // rows, so it best fills the hole between them.
        let context = [Some(0), Some(0), Some(2)];
        assert_eq!(
            model.find_context_nearest_neighbor_idx(1, 1, &context),
            Some(1)
        );
    }

    #[test]
    fn context_oov_detection() {
        let token_learner = super::SgnsTokenLearner::new();
        assert!(token_learner.context_contains_oov(&[Some(1), None, Some(2)]));
        assert!(!token_learner.context_contains_oov(&[Some(1), Some(2)]));
    }

    #[test]
    fn reset_word_reinitializes_training_state() {
        let mut model = small_model();
        for word in ["a", "b"] {
            model.increment(word).unwrap();
        }
        for _ in 0..10 {
            model.sentence_train(&["a", "b", "a"]).unwrap();
        }
        assert!(model
            .factorization()
            .get_context_embedding(0)
            .iter()
            .any(|&v| v != 0.0));

        let token_learner = *model.token_learner();
        token_learner.reset_word(model.parts_mut(), 0);

        assert!(model
            .factorization()
            .get_context_embedding(0)
            .iter()
            .all(|&v| v == 0.0));
        let bound = 0.5 / 8.0;
        assert!(model
            .factorization()
            .get_word_embedding(0)
            .iter()
            .all(|&v| v >= -bound && v < bound));
        // The step size is rewound along with the row.
        assert!(close(model.sgd().get_rho(0), 1.0, 1e-6));
    }

    #[test]
    fn sentence_train_ingests_and_trains() {
        let mut model = small_model();
        model
            .sentence_train(&["the", "quick", "fox", "the"])
            .unwrap();

        let lm = model.language_model();
        assert_eq!(lm.total(), 4);
        assert_eq!(lm.size(), 3);
        assert_eq!(lm.count(lm.lookup("the").unwrap()).unwrap(), 2);

        // Context rows of trained words moved off zero.
        let fox = lm.lookup("fox").unwrap();
        assert!(model
            .factorization()
            .get_context_embedding(fox)
            .iter()
            .any(|&v| v != 0.0));
    }

    #[test]
    fn oov_positions_are_skipped() {
        let mut model = small_model();
        for word in ["a", "b"] {
            model.increment(word).unwrap();
        }
        // "x" was never ingested; training must skip it without error.
        let learner = super::SgnsSentenceLearner::new(1, false);
        let token_learner = *model.token_learner();
        learner
            .sentence_train(model.parts_mut(), &token_learner, &["a", "x", "b"])
            .unwrap();
        assert_eq!(model.language_model().lookup("x"), None);
    }

    #[test]
    fn subsampling_counts_each_token_once() {
        let mut model = small_model();
        model
            .subsampling_sentence_train(&["a", "a", "b"])
            .unwrap();
        assert_eq!(model.language_model().total(), 3);
        assert_eq!(model.language_model().count(0).unwrap(), 2);
    }

    #[test]
    fn subsampling_discards_with_tiny_threshold() {
        let mut config = small_config();
        config.vocab.subsample_threshold = 1e-12;
        let mut model: SgnsModel<XorShiftRng> =
            SgnsModel::from_config(&config, XorShiftRng::from_seed(SEED)).unwrap();

        model
            .subsampling_sentence_train(&["a", "b", "a", "b"])
            .unwrap();

        // Everything is discarded before training, so context rows of
        // both words stay zero.
        for word_idx in 0..2 {
            assert!(model
                .factorization()
                .get_context_embedding(word_idx)
                .iter()
                .all(|&v| v == 0.0));
        }
        // But the vocabulary still observed every token.
        assert_eq!(model.language_model().total(), 4);
    }
}
