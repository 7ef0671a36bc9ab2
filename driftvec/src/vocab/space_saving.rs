use std::io::{Read, Write};

use fnv::FnvHashMap;
use rand::Rng;

use crate::error::{Error, Result};
use crate::io::{
    read_f32, read_string, read_usize, read_usize_vec, write_f32, write_string, write_usize,
    write_usize_vec, ReadModelBinary, WriteModelBinary,
};
use crate::vocab::{keep_probability, DEFAULT_SUBSAMPLE_THRESHOLD};

/// Bounded-memory approximate vocabulary (Metwally et al.).
///
/// At most `capacity` words are tracked. Once full, an unknown word takes
/// over the slot of the current minimum: the victim's external index is
/// handed to the newcomer, whose counter becomes the victim's count plus
/// one (the space-saving overestimate), and the `(index, word)` of the
/// victim is reported so per-index training state can be reset.
///
/// External indices are what the public API speaks; internal slot ids
/// address physical counter positions and may be reordered by `truncate`.
#[derive(Clone, Debug)]
pub struct SpaceSavingLanguageModel {
    subsample_threshold: f32,
    capacity: usize,
    total: usize,
    min_slot: usize,
    counters: Vec<usize>,
    word_ids: FnvHashMap<String, usize>,
    internal_ids: Vec<usize>,
    external_ids: Vec<usize>,
    words: Vec<String>,
}

impl SpaceSavingLanguageModel {
    pub fn new(num_counters: usize, subsample_threshold: f32) -> Result<Self> {
        if num_counters == 0 {
            return Err(Error::invalid_config(
                "space-saving vocabulary needs at least one counter",
            ));
        }

        Ok(SpaceSavingLanguageModel {
            subsample_threshold,
            capacity: num_counters,
            total: 0,
            min_slot: 0,
            counters: Vec::new(),
            word_ids: FnvHashMap::default(),
            internal_ids: Vec::new(),
            external_ids: Vec::new(),
            words: Vec::new(),
        })
    }

    pub fn with_capacity(num_counters: usize) -> Result<Self> {
        SpaceSavingLanguageModel::new(num_counters, DEFAULT_SUBSAMPLE_THRESHOLD)
    }

    /// Observe one token, evicting the minimum entry when full.
    pub fn increment(&mut self, word: &str) -> Option<(usize, String)> {
        self.total += 1;

        if let Some(&ext_idx) = self.word_ids.get(word) {
            let slot = self.internal_ids[ext_idx];
            self.counters[slot] += 1;
            // Counters only grow: the minimum can only move away from
            // the slot that was just incremented.
            if slot == self.min_slot {
                self.update_min_slot();
            }
            None
        } else if self.words.len() < self.capacity {
            self.unfull_append(word);
            None
        } else {
            Some(self.full_replace(word))
        }
    }

    fn unfull_append(&mut self, word: &str) {
        let slot = self.words.len();
        self.word_ids.insert(word.to_owned(), slot);
        self.words.push(word.to_owned());
        self.counters.push(1);
        self.internal_ids.push(slot);
        self.external_ids.push(slot);
        if slot == 0 || self.counters[self.min_slot] > 1 {
            self.min_slot = slot;
        }
    }

    fn full_replace(&mut self, word: &str) -> (usize, String) {
        let slot = self.min_slot;
        let ext_idx = self.external_ids[slot];
        let evicted = std::mem::replace(&mut self.words[slot], word.to_owned());
        self.word_ids.remove(&evicted);
        self.word_ids.insert(word.to_owned(), ext_idx);
        // Space-saving overestimate: the newcomer may have occurred up to
        // counters[slot] times while untracked.
        self.counters[slot] += 1;
        self.update_min_slot();
        (ext_idx, evicted)
    }

    fn update_min_slot(&mut self) {
        let mut min = 0;
        for slot in 1..self.counters.len() {
            if self.counters[slot] < self.counters[min] {
                min = slot;
            }
        }
        self.min_slot = min;
    }

    pub fn lookup(&self, word: &str) -> Option<usize> {
        self.word_ids.get(word).copied()
    }

    pub fn reverse_lookup(&self, ext_word_idx: usize) -> Result<&str> {
        self.internal_ids
            .get(ext_word_idx)
            .map(|&slot| self.words[slot].as_str())
            .ok_or_else(|| Error::out_of_range(ext_word_idx, self.words.len()))
    }

    pub fn count(&self, ext_word_idx: usize) -> Result<usize> {
        self.internal_ids
            .get(ext_word_idx)
            .map(|&slot| self.counters[slot])
            .ok_or_else(|| Error::out_of_range(ext_word_idx, self.counters.len()))
    }

    pub fn counts(&self) -> Vec<usize> {
        self.internal_ids
            .iter()
            .map(|&slot| self.counters[slot])
            .collect()
    }

    pub fn ordered_counts(&self) -> Vec<usize> {
        let mut counts = self.counters.clone();
        counts.sort_unstable_by(|a, b| b.cmp(a));
        counts
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn subsample<R: Rng>(&self, ext_word_idx: usize, rng: &mut R) -> Result<bool> {
        let count = self.count(ext_word_idx)?;
        Ok(rng.gen::<f32>() < keep_probability(self.subsample_threshold, count, self.total))
    }

    /// Drop the lowest-count entries until at most `max_size` remain,
    /// renumbering survivors densely in descending count order.
    ///
    /// Existing per-index state is invalidated; size the vocabulary
    /// before training.
    pub fn truncate(&mut self, max_size: usize) {
        let mut order: Vec<usize> = (0..self.counters.len()).collect();
        order.sort_by(|&a, &b| {
            self.counters[b]
                .cmp(&self.counters[a])
                .then_with(|| a.cmp(&b))
        });
        order.truncate(max_size);

        let words: Vec<String> = order.iter().map(|&slot| self.words[slot].clone()).collect();
        let counters: Vec<usize> = order.iter().map(|&slot| self.counters[slot]).collect();
        self.word_ids = words
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.clone(), idx))
            .collect();
        self.internal_ids = (0..words.len()).collect();
        self.external_ids = (0..words.len()).collect();
        self.words = words;
        self.counters = counters;
        self.update_min_slot();
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        subsample_threshold: f32,
        capacity: usize,
        total: usize,
        min_slot: usize,
        counters: Vec<usize>,
        internal_ids: Vec<usize>,
        external_ids: Vec<usize>,
        words: Vec<String>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_config(
                "space-saving vocabulary needs at least one counter",
            ));
        }
        let size = words.len();
        if counters.len() != size || internal_ids.len() != size || external_ids.len() != size {
            return Err(Error::invariant("slot tables differ in length"));
        }
        if size > capacity {
            return Err(Error::invariant("more live slots than counters"));
        }
        if size > 0 && min_slot >= size {
            return Err(Error::invariant("minimum slot out of range"));
        }
        for (ext_idx, &slot) in internal_ids.iter().enumerate() {
            if slot >= size || external_ids[slot] != ext_idx {
                return Err(Error::invariant("id tables are not inverses"));
            }
        }
        if size > 0 && counters.iter().min() != Some(&counters[min_slot]) {
            return Err(Error::invariant("minimum slot does not hold the minimum"));
        }
        let word_ids = words
            .iter()
            .enumerate()
            .map(|(slot, word)| (word.clone(), external_ids[slot]))
            .collect::<FnvHashMap<_, _>>();
        if word_ids.len() != size {
            return Err(Error::invariant("duplicate word in vocabulary"));
        }
        Ok(SpaceSavingLanguageModel {
            subsample_threshold,
            capacity,
            total,
            min_slot,
            counters,
            word_ids,
            internal_ids,
            external_ids,
            words,
        })
    }
}

impl PartialEq for SpaceSavingLanguageModel {
    fn eq(&self, other: &Self) -> bool {
        self.subsample_threshold.to_bits() == other.subsample_threshold.to_bits()
            && self.capacity == other.capacity
            && self.total == other.total
            && self.min_slot == other.min_slot
            && self.counters == other.counters
            && self.internal_ids == other.internal_ids
            && self.external_ids == other.external_ids
            && self.words == other.words
    }
}

impl<W> WriteModelBinary<W> for SpaceSavingLanguageModel
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_f32(write, self.subsample_threshold)?;
        write_usize(write, self.capacity)?;
        write_usize(write, self.total)?;
        write_usize(write, self.min_slot)?;
        write_usize_vec(write, &self.counters)?;
        write_usize_vec(write, &self.internal_ids)?;
        write_usize_vec(write, &self.external_ids)?;
        write_usize(write, self.words.len())?;
        for word in &self.words {
            write_string(write, word)?;
        }
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for SpaceSavingLanguageModel
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        let subsample_threshold = read_f32(read)?;
        let capacity = read_usize(read)?;
        let total = read_usize(read)?;
        let min_slot = read_usize(read)?;
        let counters = read_usize_vec(read)?;
        let internal_ids = read_usize_vec(read)?;
        let external_ids = read_usize_vec(read)?;
        let n_words = read_usize(read)?;
        let mut words = Vec::with_capacity(n_words);
        for _ in 0..n_words {
            words.push(read_string(read)?);
        }
        SpaceSavingLanguageModel::from_parts(
            subsample_threshold,
            capacity,
            total,
            min_slot,
            counters,
            internal_ids,
            external_ids,
            words,
        )
    }
}
