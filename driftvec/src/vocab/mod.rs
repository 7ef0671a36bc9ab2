pub(crate) mod naive;
pub(crate) mod space_saving;

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use rand::Rng;

use crate::error::{Error, Result};
use crate::io::{ReadModelBinary, WriteModelBinary};

pub use self::naive::NaiveLanguageModel;
pub use self::space_saving::SpaceSavingLanguageModel;

/// Frequent-word subsampling threshold as defined in word2vec.
pub const DEFAULT_SUBSAMPLE_THRESHOLD: f32 = 1e-3;

/// A streaming vocabulary with frequency statistics.
///
/// Both variants expose the same capability set over dense word indices;
/// the space-saving variant bounds memory by evicting the lowest-count
/// entry once it is full.
#[derive(Debug, PartialEq)]
pub enum LanguageModel {
    Naive(NaiveLanguageModel),
    SpaceSaving(SpaceSavingLanguageModel),
}

impl LanguageModel {
    /// Observe one token.
    ///
    /// Returns the `(index, word)` pair that was evicted to make room, if
    /// any. The caller is responsible for resetting any per-index state
    /// (embedding rows) attached to an evicted index before the new
    /// occupant trains on it.
    pub fn increment(&mut self, word: &str) -> Option<(usize, String)> {
        match self {
            LanguageModel::Naive(lm) => lm.increment(word),
            LanguageModel::SpaceSaving(lm) => lm.increment(word),
        }
    }

    /// Get the index of a word, if present.
    pub fn lookup(&self, word: &str) -> Option<usize> {
        match self {
            LanguageModel::Naive(lm) => lm.lookup(word),
            LanguageModel::SpaceSaving(lm) => lm.lookup(word),
        }
    }

    /// Get the word at an index.
    pub fn reverse_lookup(&self, word_idx: usize) -> Result<&str> {
        match self {
            LanguageModel::Naive(lm) => lm.reverse_lookup(word_idx),
            LanguageModel::SpaceSaving(lm) => lm.reverse_lookup(word_idx),
        }
    }

    /// Get the count at an index.
    pub fn count(&self, word_idx: usize) -> Result<usize> {
        match self {
            LanguageModel::Naive(lm) => lm.count(word_idx),
            LanguageModel::SpaceSaving(lm) => lm.count(word_idx),
        }
    }

    /// Get the counts of all word indices.
    pub fn counts(&self) -> Vec<usize> {
        match self {
            LanguageModel::Naive(lm) => lm.counts(),
            LanguageModel::SpaceSaving(lm) => lm.counts(),
        }
    }

    /// Get the counts of all word indices, in descending order.
    pub fn ordered_counts(&self) -> Vec<usize> {
        match self {
            LanguageModel::Naive(lm) => lm.ordered_counts(),
            LanguageModel::SpaceSaving(lm) => lm.ordered_counts(),
        }
    }

    /// Get the number of word types present.
    pub fn size(&self) -> usize {
        match self {
            LanguageModel::Naive(lm) => lm.size(),
            LanguageModel::SpaceSaving(lm) => lm.size(),
        }
    }

    /// Get the maximum number of word types, for bounded-memory variants.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            LanguageModel::Naive(_) => None,
            LanguageModel::SpaceSaving(lm) => Some(lm.capacity()),
        }
    }

    /// Get the total number of word tokens observed.
    pub fn total(&self) -> usize {
        match self {
            LanguageModel::Naive(lm) => lm.total(),
            LanguageModel::SpaceSaving(lm) => lm.total(),
        }
    }

    /// Return true if the word at an index should be kept after
    /// frequency subsampling.
    pub fn subsample<R: Rng>(&self, word_idx: usize, rng: &mut R) -> Result<bool> {
        match self {
            LanguageModel::Naive(lm) => lm.subsample(word_idx, rng),
            LanguageModel::SpaceSaving(lm) => lm.subsample(word_idx, rng),
        }
    }

    /// Drop the lowest-count entries until at most `max_size` remain.
    ///
    /// Surviving entries are renumbered densely in descending count
    /// order. Any per-index state (embedding rows, samplers) built
    /// against the old indices is invalidated, so this is only meant
    /// for sizing a vocabulary before training starts.
    pub fn truncate(&mut self, max_size: usize) {
        match self {
            LanguageModel::Naive(lm) => lm.truncate(max_size),
            LanguageModel::SpaceSaving(lm) => lm.truncate(max_size),
        }
    }
}

/// Keep probability for an index with normalized frequency `f`:
/// min(1, sqrt(threshold / f)).
pub(crate) fn keep_probability(threshold: f32, count: usize, total: usize) -> f32 {
    let f = count as f32 / total as f32;
    (threshold / f).sqrt().min(1.0)
}

impl<W> WriteModelBinary<W> for LanguageModel
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        match self {
            LanguageModel::Naive(lm) => {
                write.write_u8(0)?;
                lm.write_model_binary(write)
            }
            LanguageModel::SpaceSaving(lm) => {
                write.write_u8(1)?;
                lm.write_model_binary(write)
            }
        }
    }
}

impl<R> ReadModelBinary<R> for LanguageModel
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        match read.read_u8()? {
            0 => Ok(LanguageModel::Naive(NaiveLanguageModel::read_model_binary(
                read,
            )?)),
            1 => Ok(LanguageModel::SpaceSaving(
                SpaceSavingLanguageModel::read_model_binary(read)?,
            )),
            tag => Err(Error::deserialize(format!(
                "unknown language model tag: {}",
                tag
            ))),
        }
    }
}
