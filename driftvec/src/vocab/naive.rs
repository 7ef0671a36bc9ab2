use std::io::{Read, Write};

use fnv::FnvHashMap;
use rand::Rng;

use crate::error::{Error, Result};
use crate::io::{
    read_f32, read_string, read_usize, read_usize_vec, write_f32, write_string, write_usize,
    write_usize_vec, ReadModelBinary, WriteModelBinary,
};
use crate::vocab::{keep_probability, DEFAULT_SUBSAMPLE_THRESHOLD};

/// Exact streaming vocabulary.
///
/// Every distinct word gets its own counter; nothing is ever evicted, so
/// `increment` never reports an ejection. Suited to corpora whose type
/// count fits in memory; pair it with [`truncate`](Self::truncate) to size
/// the vocabulary before training.
#[derive(Clone, Debug)]
pub struct NaiveLanguageModel {
    subsample_threshold: f32,
    total: usize,
    counters: Vec<usize>,
    word_ids: FnvHashMap<String, usize>,
    words: Vec<String>,
}

impl Default for NaiveLanguageModel {
    fn default() -> Self {
        NaiveLanguageModel::new(DEFAULT_SUBSAMPLE_THRESHOLD)
    }
}

impl NaiveLanguageModel {
    pub fn new(subsample_threshold: f32) -> Self {
        NaiveLanguageModel {
            subsample_threshold,
            total: 0,
            counters: Vec::new(),
            word_ids: FnvHashMap::default(),
            words: Vec::new(),
        }
    }

    /// Observe one token; unknown words are allocated the next index.
    ///
    /// Always returns `None`: an exact vocabulary never ejects.
    pub fn increment(&mut self, word: &str) -> Option<(usize, String)> {
        match self.word_ids.get(word) {
            Some(&idx) => {
                self.counters[idx] += 1;
            }
            None => {
                let idx = self.words.len();
                self.word_ids.insert(word.to_owned(), idx);
                self.words.push(word.to_owned());
                self.counters.push(1);
            }
        }
        self.total += 1;
        None
    }

    pub fn lookup(&self, word: &str) -> Option<usize> {
        self.word_ids.get(word).copied()
    }

    pub fn reverse_lookup(&self, word_idx: usize) -> Result<&str> {
        self.words
            .get(word_idx)
            .map(String::as_str)
            .ok_or_else(|| Error::out_of_range(word_idx, self.words.len()))
    }

    pub fn count(&self, word_idx: usize) -> Result<usize> {
        self.counters
            .get(word_idx)
            .copied()
            .ok_or_else(|| Error::out_of_range(word_idx, self.counters.len()))
    }

    pub fn counts(&self) -> Vec<usize> {
        self.counters.clone()
    }

    pub fn ordered_counts(&self) -> Vec<usize> {
        let mut counts = self.counters.clone();
        counts.sort_unstable_by(|a, b| b.cmp(a));
        counts
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn subsample<R: Rng>(&self, word_idx: usize, rng: &mut R) -> Result<bool> {
        let count = self.count(word_idx)?;
        Ok(rng.gen::<f32>() < keep_probability(self.subsample_threshold, count, self.total))
    }

    /// Reorder words by descending count. Index assignments change.
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.words.len()).collect();
        order.sort_by(|&a, &b| {
            self.counters[b]
                .cmp(&self.counters[a])
                .then_with(|| a.cmp(&b))
        });
        self.reorder(&order);
    }

    /// Drop the lowest-count entries until at most `max_size` remain,
    /// renumbering survivors densely in descending count order.
    ///
    /// `total` keeps counting dropped tokens. Existing per-index state
    /// is invalidated; size the vocabulary before training.
    pub fn truncate(&mut self, max_size: usize) {
        self.sort();
        for word in self.words.drain(max_size.min(self.words.len())..) {
            self.word_ids.remove(&word);
        }
        self.counters.truncate(max_size);
    }

    fn reorder(&mut self, order: &[usize]) {
        let words: Vec<String> = order.iter().map(|&i| self.words[i].clone()).collect();
        let counters: Vec<usize> = order.iter().map(|&i| self.counters[i]).collect();
        self.word_ids = words
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.clone(), idx))
            .collect();
        self.words = words;
        self.counters = counters;
    }

    pub(crate) fn from_parts(
        subsample_threshold: f32,
        total: usize,
        counters: Vec<usize>,
        words: Vec<String>,
    ) -> Result<Self> {
        if counters.len() != words.len() {
            return Err(Error::invariant(
                "counter and word tables differ in length",
            ));
        }
        if counters.iter().sum::<usize>() != total {
            return Err(Error::invariant("counters do not sum to total"));
        }
        let word_ids = words
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.clone(), idx))
            .collect::<FnvHashMap<_, _>>();
        if word_ids.len() != words.len() {
            return Err(Error::invariant("duplicate word in vocabulary"));
        }
        Ok(NaiveLanguageModel {
            subsample_threshold,
            total,
            counters,
            word_ids,
            words,
        })
    }
}

impl PartialEq for NaiveLanguageModel {
    fn eq(&self, other: &Self) -> bool {
        self.subsample_threshold.to_bits() == other.subsample_threshold.to_bits()
            && self.total == other.total
            && self.counters == other.counters
            && self.words == other.words
    }
}

impl<W> WriteModelBinary<W> for NaiveLanguageModel
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_f32(write, self.subsample_threshold)?;
        write_usize(write, self.total)?;
        write_usize_vec(write, &self.counters)?;
        write_usize(write, self.words.len())?;
        for word in &self.words {
            write_string(write, word)?;
        }
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for NaiveLanguageModel
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        let subsample_threshold = read_f32(read)?;
        let total = read_usize(read)?;
        let counters = read_usize_vec(read)?;
        let n_words = read_usize(read)?;
        let mut words = Vec::with_capacity(n_words);
        for _ in 0..n_words {
            words.push(read_string(read)?);
        }
        NaiveLanguageModel::from_parts(subsample_threshold, total, counters, words)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::NaiveLanguageModel;
    use crate::error::Error;
    use crate::io::{ReadModelBinary, WriteModelBinary};

    const SEED: [u8; 16] = [
        0xc8, 0xae, 0xa3, 0x99, 0x28, 0x5a, 0xbb, 0x27, 0x90, 0xe9, 0x61, 0x60, 0xe5, 0xca, 0xfe,
        0x22,
    ];

    fn abc_model() -> NaiveLanguageModel {
        let mut lm = NaiveLanguageModel::default();
        for word in ["a", "b", "a", "c", "a", "b"] {
            assert_eq!(lm.increment(word), None);
        }
        lm
    }

    #[test]
    fn increment_counts_distinct_words() {
        let lm = abc_model();

        assert_eq!(lm.size(), 3);
        assert_eq!(lm.total(), 6);
        assert_eq!(lm.count(lm.lookup("a").unwrap()).unwrap(), 3);
        assert_eq!(lm.count(lm.lookup("b").unwrap()).unwrap(), 2);
        assert_eq!(lm.count(lm.lookup("c").unwrap()).unwrap(), 1);
        assert_eq!(lm.ordered_counts(), vec![3, 2, 1]);
        assert_eq!(lm.counts().iter().sum::<usize>(), lm.total());
    }

    #[test]
    fn reverse_lookup_inverts_lookup() {
        let lm = abc_model();
        for idx in 0..lm.size() {
            assert_eq!(lm.lookup(lm.reverse_lookup(idx).unwrap()), Some(idx));
        }
        assert!(matches!(
            lm.reverse_lookup(3),
            Err(Error::OutOfRange { index: 3, size: 3 })
        ));
    }

    #[test]
    fn sort_orders_by_descending_count() {
        let mut lm = abc_model();
        lm.sort();
        assert_eq!(lm.counts(), vec![3, 2, 1]);
        assert_eq!(lm.reverse_lookup(0).unwrap(), "a");
        assert_eq!(lm.reverse_lookup(1).unwrap(), "b");
        assert_eq!(lm.reverse_lookup(2).unwrap(), "c");
    }

    #[test]
    fn truncate_drops_low_counts() {
        let mut lm = abc_model();
        lm.truncate(2);
        assert_eq!(lm.size(), 2);
        assert_eq!(lm.counts(), vec![3, 2]);
        assert_eq!(lm.lookup("c"), None);
        assert_eq!(lm.lookup("a"), Some(0));
        // Dropped tokens are still part of the observed total.
        assert_eq!(lm.total(), 6);
    }

    #[test]
    fn subsample_keeps_rare_words() {
        let mut lm = NaiveLanguageModel::new(1e-3);
        for _ in 0..999 {
            lm.increment("the");
        }
        lm.increment("aardvark");

        let mut rng = XorShiftRng::from_seed(SEED);
        let rare = lm.lookup("aardvark").unwrap();
        // keep probability is 1: f = 1e-3 == threshold.
        for _ in 0..100 {
            assert!(lm.subsample(rare, &mut rng).unwrap());
        }

        let frequent = lm.lookup("the").unwrap();
        let kept = (0..10_000)
            .filter(|_| lm.subsample(frequent, &mut rng).unwrap())
            .count();
        // keep probability is sqrt(1e-3 / 0.999) ~ 0.0316.
        assert!(kept > 150 && kept < 500, "kept {} of 10000", kept);
    }

    #[test]
    fn round_trip() {
        let lm = abc_model();
        let mut buf = Vec::new();
        lm.write_model_binary(&mut buf).unwrap();
        let read = NaiveLanguageModel::read_model_binary(&mut Cursor::new(buf)).unwrap();
        assert_eq!(lm, read);
    }

    #[test]
    fn corrupt_totals_are_rejected() {
        let lm = abc_model();
        let mut buf = Vec::new();
        lm.write_model_binary(&mut buf).unwrap();
        // The total is the second field; nudge it.
        buf[4] = buf[4].wrapping_add(1);
        assert!(matches!(
            NaiveLanguageModel::read_model_binary(&mut Cursor::new(buf)),
            Err(Error::Invariant(_))
        ));
    }
}
