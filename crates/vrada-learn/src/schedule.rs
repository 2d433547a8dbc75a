//! Schedules for the gradient reversal coefficient and the learning rate.
//!
//! `progress` is the fraction of training completed, in `[0, 1]`.

/// `2 / (1 + exp(-gamma · p)) - 1`: rises from 0 to ≈1, so the domain
/// classifier's noisy early signal is damped.
///
/// # Example
///
/// ```
/// use vrada_learn::schedule::grl_lambda;
///
/// assert_eq!(grl_lambda(0.0, 10.0), 0.0);
/// assert!(grl_lambda(1.0, 10.0) > 0.99);
/// ```
pub fn grl_lambda(progress: f64, gamma: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    2.0 / (1.0 + (-gamma * p).exp()) - 1.0
}

/// `lr0 / (1 + 10 p)^0.75`.
pub fn learning_rate(lr0: f64, progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    lr0 / (1.0 + 10.0 * p).powf(0.75)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lambda_is_monotonic() {
        let mut prev = -1.0;
        for i in 0..=100 {
            let v = grl_lambda(i as f64 / 100.0, 10.0);
            assert!(v >= prev);
            assert!((0.0..1.0).contains(&v));
            prev = v;
        }
    }

    #[test]
    fn lambda_clamps_progress() {
        assert_eq!(grl_lambda(-1.0, 10.0), 0.0);
        assert_eq!(grl_lambda(5.0, 10.0), grl_lambda(1.0, 10.0));
    }

    #[test]
    fn learning_rate_anneals() {
        assert_eq!(learning_rate(0.01, 0.0), 0.01);
        let end = learning_rate(0.01, 1.0);
        assert!((end - 0.01 / 11f64.powf(0.75)).abs() < 1e-12);
        assert!(learning_rate(0.01, 0.5) > end);
    }
}
