//! Deterministic PRNG for synthetic data and batch sampling.
//!
//! splitmix64 core with uniform, normal and index helpers. Model-side noise
//! (dropout, VRNN sampling) comes from candle's own generator instead.

/// Deterministic PRNG based on splitmix64.
///
/// # Example
///
/// ```
/// use vrada_learn::nn_rng::SimpleRng;
///
/// let mut rng = SimpleRng::new(7);
/// let i = rng.next_index(10);
/// assert!(i < 10);
/// ```
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
    spare_normal: Option<f32>,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed,
            spare_normal: None,
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / ((1u64 << 24) as f32)
    }

    /// Uniform in `[lo, hi)`.
    pub fn next_f32_range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Standard normal via Box-Muller; the second variate is cached.
    pub fn next_normal(&mut self) -> f32 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        // 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - self.next_f32();
        let u2 = self.next_f32();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;
        self.spare_normal = Some(radius * theta.sin());
        radius * theta.cos()
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    pub fn next_index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let mut r1 = SimpleRng::new(42);
        let mut r2 = SimpleRng::new(42);
        for _ in 0..100 {
            assert_eq!(r1.next_u64(), r2.next_u64());
            assert_eq!(r1.next_normal(), r2.next_normal());
        }
    }

    #[test]
    fn f32_range_in_bounds() {
        let mut rng = SimpleRng::new(42);
        for _ in 0..1000 {
            let v = rng.next_f32_range(-0.5, 0.5);
            assert!((-0.5..0.5).contains(&v));
        }
    }

    #[test]
    fn normal_moments() {
        let mut rng = SimpleRng::new(3);
        let n = 20_000;
        let samples: Vec<f32> = (0..n).map(|_| rng.next_normal()).collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "var {var}");
        assert!(samples.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn index_in_range() {
        let mut rng = SimpleRng::new(9);
        let mut seen = [false; 5];
        for _ in 0..500 {
            seen[rng.next_index(5)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
