//! Random reference profiles for unknown cell types.
//!
//! When the caller asks for more cell types than the reference panel
//! carries, the new columns are seeded with draws from empirical
//! methylation level distributions. The sampler is injected as a trait so
//! the deconvolution path stays deterministic under a seeded RNG in tests.

use rand::Rng;

/// Capability to draw one methylation or hydroxymethylation level.
pub trait ProfileSampler {
    fn methylation(&mut self) -> f64;
    fn hydroxymethylation(&mut self) -> f64;
}

/// CpG methylation rates in ONT data follow the expected bimodal
/// distribution with peaks near 0% and 100%; this discrete table recreates
/// it cheaply.
const METHYLATION_LEVELS: [f64; 10] = [
    0.0, 0.0, 0.0408, 0.1209, 0.2, 0.3, 0.5, 0.6, 0.85, 1.0,
];

/// Hydroxymethylation is low almost everywhere outside neurons; we use the
/// distribution seen in non-neuronal cell types.
const HYDROXYMETHYLATION_LEVELS: [f64; 9] = [0.0, 0.0, 0.0, 0.0, 0.1, 0.1, 0.1, 0.2, 0.4];

/// Samples uniformly from the empirical level tables.
pub struct EmpiricalSampler<R: Rng> {
    rng: R,
}

impl<R: Rng> EmpiricalSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> ProfileSampler for EmpiricalSampler<R> {
    fn methylation(&mut self) -> f64 {
        METHYLATION_LEVELS[self.rng.gen_range(0..METHYLATION_LEVELS.len())]
    }

    fn hydroxymethylation(&mut self) -> f64 {
        HYDROXYMETHYLATION_LEVELS[self.rng.gen_range(0..HYDROXYMETHYLATION_LEVELS.len())]
    }
}
