//! Random draws used by the noise model.
//!
//! Inverse-CDF failures are logged and yield zero instead of aborting.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use log::warn;
use rand::distributions::Open01;
use rand::{Rng, RngCore};
use statrs::distribution::{Binomial, ContinuousCDF, DiscreteCDF, Normal};
use thiserror::Error;

#[derive(Error, Debug)]
enum SamplingError {
    #[error("invalid binomial parameters n = {n}, p = {p}")]
    BinomialParameters { n: usize, p: f64 },

    #[error("normal inverse CDF undefined at {0}")]
    InverseCdf(f64),
}

/// Probability that a standard normal exceeds `limit`.
#[inline]
pub fn upper_tail(limit: f64) -> f64 {
    sisim_core::bivariate::phi(-limit)
}

/// Standard normal draw.
pub fn gaussian(rng: &mut dyn RngCore) -> f64 {
    let u: f64 = rng.sample(Open01);
    standard_quantile(u).unwrap_or_else(|err| {
        warn!("gaussian draw failed: {err}");
        0.0
    })
}

/// Number of successes in `n` trials of probability `p`.
pub fn binomial(n: usize, p: f64, rng: &mut dyn RngCore) -> usize {
    if n == 0 || p <= 0.0 {
        return 0;
    }
    if p >= 1.0 {
        return n;
    }
    draw_binomial(n, p, rng.gen::<f64>()).unwrap_or_else(|err| {
        warn!("binomial draw failed: {err}");
        0
    })
}

/// Standard normal draw conditioned on lying in the upper tail of mass `tail`.
pub fn gaussian_above(tail: f64, rng: &mut dyn RngCore) -> f64 {
    let u: f64 = rng.gen();
    standard_quantile(tail * (1.0 - u))
        .map(|x| -x)
        .unwrap_or_else(|err| {
            warn!("truncated gaussian draw failed: {err}");
            0.0
        })
}

fn draw_binomial(n: usize, p: f64, u: f64) -> Result<usize, SamplingError> {
    let dist = Binomial::new(p, n as u64).map_err(|_| SamplingError::BinomialParameters { n, p })?;
    Ok(dist.inverse_cdf(u) as usize)
}

fn standard_quantile(probability: f64) -> Result<f64, SamplingError> {
    if probability.is_nan() || probability <= 0.0 || probability >= 1.0 {
        return Err(SamplingError::InverseCdf(probability));
    }
    let x = Normal::standard().inverse_cdf(probability);
    if x.is_finite() {
        Ok(x)
    } else {
        Err(SamplingError::InverseCdf(probability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_upper_tail() {
        assert_relative_eq!(upper_tail(0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(upper_tail(4.0), 3.167e-5, epsilon = 1e-7);
    }

    #[test]
    fn test_binomial_edges() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(binomial(0, 0.5, &mut rng), 0);
        assert_eq!(binomial(100, 0.0, &mut rng), 0);
        assert_eq!(binomial(100, 1.0, &mut rng), 100);
        assert!(binomial(100, 0.3, &mut rng) <= 100);
    }

    #[test]
    fn test_binomial_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let trials = 2000;
        let total: usize = (0..trials).map(|_| binomial(1000, 0.01, &mut rng)).sum();
        let mean = total as f64 / f64::from(trials);
        assert!((mean - 10.0).abs() < 0.5, "mean = {mean}");
    }

    #[test]
    fn test_gaussian_above_respects_threshold() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let limit = 3.0;
        let tail = upper_tail(limit);
        for _ in 0..1000 {
            let x = gaussian_above(tail, &mut rng);
            assert!(x >= limit - 1e-9, "x = {x}");
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| gaussian(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / f64::from(n);
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / f64::from(n);
        assert!(mean.abs() < 0.05, "mean = {mean}");
        assert!((var - 1.0).abs() < 0.05, "var = {var}");
    }

    #[test]
    fn test_invalid_tail_falls_back_to_zero() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert!(gaussian_above(0.0, &mut rng).abs() < f64::EPSILON);
    }
}
