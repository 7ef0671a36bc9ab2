use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::io::{
    read_f32, read_f32_vec, read_usize_vec, write_f32, write_f32_vec, write_usize_vec,
    ReadModelBinary, WriteModelBinary,
};
use crate::util::bits_eq;
use crate::vec_simd;

/// Default decay exponent.
pub const DEFAULT_KAPPA: f32 = 0.6;

/// Stochastic gradient descent parametrization and state.
///
/// Each dimension carries its own step counter `t` and step size
/// `rho = max(rho_lower_bound, (tau + t)^-kappa)`. The training core
/// drives a single dimension, but the state is kept per-dimension so a
/// caller can shard it differently.
#[derive(Clone, Debug)]
pub struct Sgd {
    tau: f32,
    kappa: f32,
    rho_lower_bound: f32,
    rho: Vec<f32>,
    t: Vec<usize>,
}

impl Sgd {
    pub fn new(dimension: usize, tau: f32, kappa: f32, rho_lower_bound: f32) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::invalid_config("SGD needs at least one dimension"));
        }
        if !tau.is_finite() || tau < 0.0 {
            return Err(Error::invalid_config(format!(
                "SGD shift must be finite and non-negative, got {}",
                tau
            )));
        }
        if !kappa.is_finite() || kappa <= 0.0 || kappa > 1.0 {
            return Err(Error::invalid_config(format!(
                "SGD decay exponent must be in (0, 1], got {}",
                kappa
            )));
        }
        if !rho_lower_bound.is_finite() || rho_lower_bound < 0.0 {
            return Err(Error::invalid_config(format!(
                "SGD step size floor must be finite and non-negative, got {}",
                rho_lower_bound
            )));
        }

        let mut sgd = Sgd {
            tau,
            kappa,
            rho_lower_bound,
            rho: vec![0.0; dimension],
            t: vec![0; dimension],
        };
        for dim in 0..dimension {
            sgd.compute_rho(dim);
        }
        Ok(sgd)
    }

    pub fn dimension(&self) -> usize {
        self.rho.len()
    }

    /// Advance the step counter of a dimension, decaying its step size.
    pub fn step(&mut self, dim: usize) {
        self.t[dim] += 1;
        self.compute_rho(dim);
    }

    /// Current step size of a dimension.
    pub fn get_rho(&self, dim: usize) -> f32 {
        self.rho[dim]
    }

    /// Gradient step: `x -= rho[dim] * g`.
    pub fn gradient_update(&self, dim: usize, g: &[f32], x: &mut [f32]) {
        vec_simd::scaled_add(x, g, -self.rho[dim]);
    }

    /// Scaled gradient step: `x -= alpha * rho[dim] * g`.
    pub fn scaled_gradient_update(&self, dim: usize, g: &[f32], x: &mut [f32], alpha: f32) {
        vec_simd::scaled_add(x, g, -alpha * self.rho[dim]);
    }

    /// Rewind a dimension to its initial step size.
    pub fn reset(&mut self, dim: usize) {
        self.t[dim] = 0;
        self.compute_rho(dim);
    }

    fn compute_rho(&mut self, dim: usize) {
        let offset = self.tau + self.t[dim] as f32;
        // A zero offset would make the power blow up; start from a unit
        // step size instead.
        let rho = if offset > 0.0 {
            offset.powf(-self.kappa)
        } else {
            1.0
        };
        self.rho[dim] = rho.max(self.rho_lower_bound);
    }

    pub(crate) fn from_parts(
        tau: f32,
        kappa: f32,
        rho_lower_bound: f32,
        rho: Vec<f32>,
        t: Vec<usize>,
    ) -> Result<Self> {
        if rho.len() != t.len() || rho.is_empty() {
            return Err(Error::invariant("step size and counter tables mismatch"));
        }
        Ok(Sgd {
            tau,
            kappa,
            rho_lower_bound,
            rho,
            t,
        })
    }
}

impl PartialEq for Sgd {
    fn eq(&self, other: &Self) -> bool {
        self.tau.to_bits() == other.tau.to_bits()
            && self.kappa.to_bits() == other.kappa.to_bits()
            && self.rho_lower_bound.to_bits() == other.rho_lower_bound.to_bits()
            && bits_eq(&self.rho, &other.rho)
            && self.t == other.t
    }
}

impl<W> WriteModelBinary<W> for Sgd
where
    W: Write,
{
    fn write_model_binary(&self, write: &mut W) -> Result<()> {
        write_f32(write, self.tau)?;
        write_f32(write, self.kappa)?;
        write_f32(write, self.rho_lower_bound)?;
        write_f32_vec(write, &self.rho)?;
        write_usize_vec(write, &self.t)?;
        Ok(())
    }
}

impl<R> ReadModelBinary<R> for Sgd
where
    R: Read,
{
    fn read_model_binary(read: &mut R) -> Result<Self> {
        let tau = read_f32(read)?;
        let kappa = read_f32(read)?;
        let rho_lower_bound = read_f32(read)?;
        let rho = read_f32_vec(read)?;
        let t = read_usize_vec(read)?;
        Sgd::from_parts(tau, kappa, rho_lower_bound, rho, t)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::Sgd;
    use crate::error::Error;
    use crate::io::{ReadModelBinary, WriteModelBinary};
    use crate::util::{all_close, close};

    #[test]
    fn step_sizes_decay_to_the_floor() {
        let mut sgd = Sgd::new(1, 0.0, 0.5, 0.01).unwrap();

        sgd.step(0);
        assert!(close(sgd.get_rho(0), 1.0, 1e-6));

        for _ in 1..4 {
            sgd.step(0);
        }
        assert!(close(sgd.get_rho(0), 0.5, 1e-6));

        for _ in 4..1_000_000 {
            sgd.step(0);
        }
        assert!(close(sgd.get_rho(0), 0.01, 1e-6));
    }

    #[test]
    fn step_sizes_are_monotone() {
        let mut sgd = Sgd::new(1, 2.0, 0.6, 0.0).unwrap();
        let mut last = sgd.get_rho(0);
        for _ in 0..1000 {
            sgd.step(0);
            assert!(sgd.get_rho(0) <= last);
            last = sgd.get_rho(0);
        }
    }

    #[test]
    fn reset_restores_the_initial_step_size() {
        let mut sgd = Sgd::new(1, 1.0, 0.6, 0.0).unwrap();
        let initial = sgd.get_rho(0);
        for _ in 0..100 {
            sgd.step(0);
        }
        assert!(sgd.get_rho(0) < initial);
        sgd.reset(0);
        assert!(close(sgd.get_rho(0), initial, 1e-6));
    }

    #[test]
    fn gradient_updates_scale_by_rho() {
        let mut sgd = Sgd::new(1, 0.0, 0.5, 0.0).unwrap();
        // One step: rho = 1; three more: rho = 0.5.
        for _ in 0..4 {
            sgd.step(0);
        }

        let g = [1.0, -2.0, 0.5];
        let mut x = [0.0, 0.0, 0.0];
        sgd.gradient_update(0, &g, &mut x);
        assert!(all_close(&x, &[-0.5, 1.0, -0.25], 1e-6));

        sgd.scaled_gradient_update(0, &g, &mut x, -2.0);
        assert!(all_close(&x, &[0.5, -1.0, 0.25], 1e-6));
    }

    #[test]
    fn invalid_hyperparameters_are_rejected() {
        assert!(matches!(
            Sgd::new(0, 0.0, 0.6, 0.0),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Sgd::new(1, f32::NAN, 0.6, 0.0),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Sgd::new(1, 0.0, 1.5, 0.0),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Sgd::new(1, 0.0, 0.6, -0.1),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn round_trip() {
        let mut sgd = Sgd::new(1, 0.5, 0.7, 0.001).unwrap();
        for _ in 0..17 {
            sgd.step(0);
        }
        let mut buf = Vec::new();
        sgd.write_model_binary(&mut buf).unwrap();
        let read = Sgd::read_model_binary(&mut Cursor::new(buf)).unwrap();
        assert_eq!(sgd, read);
    }
}
