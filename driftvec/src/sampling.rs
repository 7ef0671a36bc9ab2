use std::cmp::Ordering;
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::io::{
    read_bool, read_f32, read_f32_vec, read_usize, read_usize_vec, write_bool, write_f32,
    write_f32_vec, write_usize, write_usize_vec, ReadModelBinary, WriteModelBinary,
};
use crate::vocab::LanguageModel;

/// Number of sampler steps after which the empirical distribution is
/// recomputed.
pub const DEFAULT_REFRESH_INTERVAL: usize = 64000;

/// Number of initial sampler steps during which the empirical
/// distribution is recomputed on every step.
pub const DEFAULT_REFRESH_BURN_IN: usize = 32000;

/// Default reservoir capacity.
pub const DEFAULT_RESERVOIR_SIZE: usize = 100_000_000;

/// Transforms a count vector into a probability vector.
///
/// Counts are smoothed as `(count + offset)^exponent` and normalized to
/// sum to one.
#[derive(Clone, Debug)]
pub struct CountNormalizer {
    exponent: f32,
    offset: f32,
}

impl Default for CountNormalizer {
    fn default() -> Self {
        CountNormalizer {
            exponent: 1.0,
            offset: 0.0,
        }
    }
}

impl CountNormalizer {
    pub fn new(exponent: f32, offset: f32) -> Result<Self> {
        if !exponent.is_finite() || !offset.is_finite() || offset < 0.0 {
            return Err(Error::invalid_config(format!(
                "count normalizer needs finite exponent and non-negative offset, got {} / {}",
                exponent, offset
            )));
        }
        Ok(CountNormalizer { exponent, offset })
    }

    pub fn normalize(&self, counts: &[usize]) -> Vec<f32> {
        let mut weights: Vec<f32> = counts
            .iter()
            .map(|&c| (c as f32 + self.offset).powf(self.exponent))
            .collect();
        let sum: f32 = weights.iter().sum();
        if sum > 0.0 {
            for weight in &mut weights {
                *weight /= sum;
            }
        }
        weights
    }
}

impl PartialEq for CountNormalizer {
    fn eq(&self, other: &Self) -> bool {
        self.exponent.to_bits() == other.exponent.to_bits()
            && self.offset.to_bits() == other.offset.to_bits()
    }
}

impl<W> WriteModelBinary<W> for CountNormalizer
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_f32(write, self.exponent)?;
        write_f32(write, self.offset)?;
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for CountNormalizer
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        let exponent = read_f32(read)?;
        let offset = read_f32(read)?;
        CountNormalizer::new(exponent, offset)
    }
}

/// O(1) categorical sampler over a fixed distribution (Walker's method).
///
/// Immutable after construction; the strategies below rebuild a fresh
/// sampler whenever the distribution drifts.
#[derive(Clone, Debug)]
pub struct AliasSampler {
    prob: Vec<f32>,
    alias: Vec<usize>,
}

impl AliasSampler {
    pub fn new(probabilities: Vec<f32>) -> Self {
        let n = probabilities.len();
        let mut prob = vec![0f32; n];
        let mut alias = vec![0usize; n];

        let mut scaled: Vec<f32> = probabilities.iter().map(|p| p * n as f32).collect();
        let mut small: Vec<usize> = Vec::new();
        let mut large: Vec<usize> = Vec::new();
        for (idx, &p) in scaled.iter().enumerate() {
            if p < 1.0 {
                small.push(idx);
            } else {
                large.push(idx);
            }
        }

        loop {
            match (small.pop(), large.pop()) {
                (Some(s), Some(l)) => {
                    prob[s] = scaled[s];
                    alias[s] = l;
                    scaled[l] = (scaled[l] + scaled[s]) - 1.0;
                    if scaled[l] < 1.0 {
                        small.push(l);
                    } else {
                        large.push(l);
                    }
                }
                // Leftovers are all-but-one probability mass; rounding
                // error is absorbed by pinning them to one.
                (Some(rest), None) | (None, Some(rest)) => prob[rest] = 1.0,
                (None, None) => break,
            }
        }

        AliasSampler { prob, alias }
    }

    pub fn len(&self) -> usize {
        self.prob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prob.is_empty()
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let idx = rng.gen_range(0..self.prob.len());
        if rng.gen::<f32>() < self.prob[idx] {
            idx
        } else {
            self.alias[idx]
        }
    }

    pub(crate) fn from_parts(prob: Vec<f32>, alias: Vec<usize>) -> Result<Self> {
        if prob.len() != alias.len() {
            return Err(Error::invariant("alias tables differ in length"));
        }
        if alias.iter().any(|&a| a >= prob.len().max(1)) {
            return Err(Error::invariant("alias entry out of range"));
        }
        Ok(AliasSampler { prob, alias })
    }
}

impl PartialEq for AliasSampler {
    fn eq(&self, other: &Self) -> bool {
        crate::util::bits_eq(&self.prob, &other.prob) && self.alias == other.alias
    }
}

impl<W> WriteModelBinary<W> for AliasSampler
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_f32_vec(write, &self.prob)?;
        write_usize_vec(write, &self.alias)?;
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for AliasSampler
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        let prob = read_f32_vec(read)?;
        let alias = read_usize_vec(read)?;
        AliasSampler::from_parts(prob, alias)
    }
}

/// Fixed-capacity uniform sample of a stream.
///
/// Items are appended until the reservoir is full; afterwards each new
/// item replaces a random slot with probability `capacity / seen`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReservoirSampler<T> {
    capacity: usize,
    seen: usize,
    values: Vec<T>,
}

impl<T> ReservoirSampler<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_config(
                "reservoir sampler needs a non-zero capacity",
            ));
        }
        Ok(ReservoirSampler {
            capacity,
            seen: 0,
            values: Vec::new(),
        })
    }

    /// Offer an item to the reservoir.
    ///
    /// Returns the discarded item: the replaced occupant, the offered
    /// item itself if it was not retained, or `None` while the
    /// reservoir is still filling.
    pub fn insert<R: Rng>(&mut self, item: T, rng: &mut R) -> Option<T> {
        self.seen += 1;
        if self.values.len() < self.capacity {
            self.values.push(item);
            None
        } else {
            let slot = rng.gen_range(0..self.seen);
            if slot < self.capacity {
                Some(std::mem::replace(&mut self.values[slot], item))
            } else {
                Some(item)
            }
        }
    }

    /// Uniform pick from the current contents.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&T> {
        if self.values.is_empty() {
            None
        } else {
            Some(&self.values[rng.gen_range(0..self.values.len())])
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.seen = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn filled(&self) -> usize {
        self.values.len()
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

/// Refresh rule for the empirical strategy: rebuild during burn-in and
/// every `interval` steps thereafter.
fn should_refresh(initialized: bool, t: usize, burn_in: usize, interval: usize) -> bool {
    !initialized || t < burn_in || (t - burn_in) % interval == 0
}

/// Source of negative-sample word indices, kept coherent with a
/// drifting vocabulary.
///
/// `step` is called for every token the vocabulary observes; `reset`
/// rebuilds the distribution wholesale from the current counts.
#[derive(Debug)]
pub enum SamplingStrategy<R> {
    /// Uniform over the live vocabulary.
    Uniform { rng: R },

    /// Draws from a (potentially stale) empirical distribution over the
    /// vocabulary counts, rebuilt on the refresh schedule.
    Empirical {
        refresh_interval: usize,
        refresh_burn_in: usize,
        normalizer: CountNormalizer,
        alias: Option<AliasSampler>,
        t: usize,
        rng: R,
    },

    /// Draws uniformly from a reservoir of observed word indices.
    Reservoir {
        reservoir: ReservoirSampler<usize>,
        rng: R,
    },
}

impl<R> SamplingStrategy<R>
where
    R: Rng,
{
    pub fn uniform(rng: R) -> Self {
        SamplingStrategy::Uniform { rng }
    }

    pub fn empirical(
        normalizer: CountNormalizer,
        refresh_interval: usize,
        refresh_burn_in: usize,
        rng: R,
    ) -> Result<Self> {
        if refresh_interval == 0 {
            return Err(Error::invalid_config(
                "empirical sampling needs a non-zero refresh interval",
            ));
        }
        Ok(SamplingStrategy::Empirical {
            refresh_interval,
            refresh_burn_in,
            normalizer,
            alias: None,
            t: 0,
            rng,
        })
    }

    pub fn reservoir(capacity: usize, rng: R) -> Result<Self> {
        Ok(SamplingStrategy::Reservoir {
            reservoir: ReservoirSampler::new(capacity)?,
            rng,
        })
    }

    /// Draw a negative-sample word index.
    pub fn sample_idx(&mut self, language_model: &LanguageModel) -> Result<usize> {
        match self {
            SamplingStrategy::Uniform { rng } => {
                if language_model.size() == 0 {
                    return Err(Error::invariant("sampling from an empty vocabulary"));
                }
                Ok(rng.gen_range(0..language_model.size()))
            }
            SamplingStrategy::Empirical {
                normalizer,
                alias,
                rng,
                ..
            } => {
                if language_model.size() == 0 {
                    return Err(Error::invariant("sampling from an empty vocabulary"));
                }
                let alias = alias.get_or_insert_with(|| {
                    AliasSampler::new(normalizer.normalize(&language_model.counts()))
                });
                Ok(alias.sample(rng))
            }
            SamplingStrategy::Reservoir { reservoir, rng } => reservoir
                .sample(rng)
                .copied()
                .ok_or_else(|| Error::invariant("sampling from an empty reservoir")),
        }
    }

    /// Observe one ingested token.
    pub fn step(&mut self, language_model: &LanguageModel, word_idx: usize) {
        match self {
            SamplingStrategy::Uniform { .. } => {}
            SamplingStrategy::Empirical {
                refresh_interval,
                refresh_burn_in,
                normalizer,
                alias,
                t,
                ..
            } => {
                *t += 1;
                if should_refresh(alias.is_some(), *t, *refresh_burn_in, *refresh_interval) {
                    // The previous table is dropped wholesale.
                    *alias = Some(AliasSampler::new(
                        normalizer.normalize(&language_model.counts()),
                    ));
                }
            }
            SamplingStrategy::Reservoir { reservoir, rng } => {
                reservoir.insert(word_idx, rng);
            }
        }
    }

    /// Rebuild the distribution from the current counts, using the
    /// supplied normalizer.
    pub fn reset(&mut self, language_model: &LanguageModel, normalizer: &CountNormalizer) {
        match self {
            SamplingStrategy::Uniform { .. } => {}
            SamplingStrategy::Empirical { alias, .. } => {
                *alias = Some(AliasSampler::new(
                    normalizer.normalize(&language_model.counts()),
                ));
            }
            SamplingStrategy::Reservoir { reservoir, rng } => {
                // Deterministic refill: with a large reservoir and a small
                // vocabulary this is much cheaper than sampling, and the
                // composition error is below one slot per word.
                let mut weights = normalizer.normalize(&language_model.counts());
                reservoir.clear();

                let capacity = reservoir.capacity();
                let mut inserted = 0;
                for (word_idx, weight) in weights.iter_mut().enumerate() {
                    let scaled = *weight * capacity as f32;
                    let whole = scaled as usize;
                    for _ in 0..whole {
                        reservoir.insert(word_idx, rng);
                    }
                    inserted += whole;
                    *weight = scaled - whole as f32;
                }

                // Fill the remaining slots cyclically, largest fractional
                // remainders first; ties go to the lower index.
                let mut remainders: Vec<(usize, f32)> =
                    weights.iter().copied().enumerate().collect();
                remainders.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                });
                if !remainders.is_empty() {
                    let mut next = 0;
                    while inserted < capacity {
                        reservoir.insert(remainders[next % remainders.len()].0, rng);
                        inserted += 1;
                        next += 1;
                    }
                }
            }
        }
    }
}

impl<R> PartialEq for SamplingStrategy<R> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SamplingStrategy::Uniform { .. }, SamplingStrategy::Uniform { .. }) => true,
            (
                SamplingStrategy::Empirical {
                    refresh_interval,
                    refresh_burn_in,
                    normalizer,
                    alias,
                    t,
                    ..
                },
                SamplingStrategy::Empirical {
                    refresh_interval: other_interval,
                    refresh_burn_in: other_burn_in,
                    normalizer: other_normalizer,
                    alias: other_alias,
                    t: other_t,
                    ..
                },
            ) => {
                refresh_interval == other_interval
                    && refresh_burn_in == other_burn_in
                    && normalizer == other_normalizer
                    && alias == other_alias
                    && t == other_t
            }
            (
                SamplingStrategy::Reservoir { reservoir, .. },
                SamplingStrategy::Reservoir {
                    reservoir: other_reservoir,
                    ..
                },
            ) => reservoir == other_reservoir,
            _ => false,
        }
    }
}

impl<W, R> WriteModelBinary<W> for SamplingStrategy<R>
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        match self {
            SamplingStrategy::Uniform { .. } => {
                write.write_u8(0)?;
            }
            SamplingStrategy::Empirical {
                refresh_interval,
                refresh_burn_in,
                normalizer,
                alias,
                t,
                ..
            } => {
                write.write_u8(1)?;
                write_usize(write, *refresh_interval)?;
                write_usize(write, *refresh_burn_in)?;
                normalizer.write_model_binary(write)?;
                write_bool(write, alias.is_some())?;
                if let Some(alias) = alias {
                    alias.write_model_binary(write)?;
                }
                write_usize(write, *t)?;
            }
            SamplingStrategy::Reservoir { reservoir, .. } => {
                write.write_u8(2)?;
                write_usize(write, reservoir.capacity())?;
                write_usize(write, reservoir.seen())?;
                write_usize_vec(write, reservoir.values())?;
            }
        }
        Ok(())
    }
}

impl<RD, R> ReadModelBinary<RD> for SamplingStrategy<R>
where
    RD: Read,
    R: Rng + SeedableRng,
{
    fn read_model_binary(read: &mut RD) -> Result<Self> {
        match read.read_u8()? {
            0 => Ok(SamplingStrategy::Uniform {
                rng: R::from_entropy(),
            }),
            1 => {
                let refresh_interval = read_usize(read)?;
                let refresh_burn_in = read_usize(read)?;
                let normalizer = CountNormalizer::read_model_binary(read)?;
                let alias = if read_bool(read)? {
                    Some(AliasSampler::read_model_binary(read)?)
                } else {
                    None
                };
                let t = read_usize(read)?;
                if refresh_interval == 0 {
                    return Err(Error::deserialize("zero refresh interval"));
                }
                Ok(SamplingStrategy::Empirical {
                    refresh_interval,
                    refresh_burn_in,
                    normalizer,
                    alias,
                    t,
                    rng: R::from_entropy(),
                })
            }
            2 => {
                let capacity = read_usize(read)?;
                let seen = read_usize(read)?;
                let values = read_usize_vec(read)?;
                if capacity == 0 {
                    return Err(Error::deserialize("zero reservoir capacity"));
                }
                if values.len() > capacity {
                    return Err(Error::invariant("reservoir holds more than its capacity"));
                }
                Ok(SamplingStrategy::Reservoir {
                    reservoir: ReservoirSampler {
                        capacity,
                        seen,
                        values,
                    },
                    rng: R::from_entropy(),
                })
            }
            tag => Err(Error::deserialize(format!(
                "unknown sampling strategy tag: {}",
                tag
            ))),
        }
    }
}
