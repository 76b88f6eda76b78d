//! Coherent 3D noise used as the vortex flow field.

use std::f32::consts::TAU;

use noise::{NoiseFn, Simplex};

pub const NOISE_STEPS: f32 = 3.0;
pub const X_OFF: f32 = 0.00125;
pub const Y_OFF: f32 = 0.00125;
pub const Z_OFF: f32 = 0.0005;

/// Deterministic simplex noise. Owned by whichever engine samples it; the
/// same seed always yields the same field.
#[derive(Clone)]
pub struct NoiseField {
    simplex: Simplex,
    seed: u32,
}

impl NoiseField {
    pub fn new(seed: u32) -> Self {
        Self { simplex: Simplex::new(seed), seed }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Noise value in [-1, 1].
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        let n = self.simplex.get([x as f64, y as f64, z as f64]) as f32;
        n.clamp(-1.0, 1.0)
    }

    /// Flow direction (radians) at pixel position `(x, y)` on frame `tick`.
    pub fn flow_angle(&self, x: f32, y: f32, tick: u64) -> f32 {
        self.sample(x * X_OFF, y * Y_OFF, tick as f32 * Z_OFF) * NOISE_STEPS * TAU
    }
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField").field("seed", &self.seed).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_and_deterministic() {
        let a = NoiseField::new(42);
        let b = NoiseField::new(42);
        for i in 0..2000 {
            let (x, y, z) = (i as f32 * 0.37, i as f32 * -0.11, i as f32 * 0.013);
            let n = a.sample(x, y, z);
            assert!((-1.0..=1.0).contains(&n), "{n} out of range");
            assert_eq!(n, b.sample(x, y, z));
        }
    }

    #[test]
    fn field_is_not_constant() {
        let field = NoiseField::new(1);
        let samples: Vec<f32> = (0..64).map(|i| field.sample(i as f32 * 0.7, 0.3, 0.0)).collect();
        let min = samples.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = samples.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max - min > 0.1);
    }

    #[test]
    fn usable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoiseField>();
    }
}
