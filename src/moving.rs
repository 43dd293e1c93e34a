//! Running-statistics trackers
//!
//! A [`RunningStatistic`] folds per-batch estimates into a long-lived
//! running estimate. The normalization layer owns two independent trackers
//! (mean and variance) and calls [`RunningStatistic::update`] only on
//! training forward passes; inference reads [`RunningStatistic::current`]
//! and never mutates the tracker.
//!
//! The combination policy belongs to the tracker, not the layer:
//! [`ExponentialMovingAverage`] is the production default,
//! [`CumulativeAverage`] averages every sample with equal weight, and
//! [`LatestValue`] keeps the most recent sample (useful as a test double or
//! for single-batch calibration).

use ndarray::{ArrayD, ScalarOperand};
use num_traits::Float;

use crate::error::{NormError, Result};

/// A long-lived running estimate fed by per-batch samples.
///
/// The first `update` initializes internal storage from the sample's shape;
/// later samples fold into the prior state under the implementation's own
/// policy. A sample with a different shape re-initializes the estimate.
pub trait RunningStatistic<T> {
    /// Incorporate a new batch estimate into the running estimate.
    fn update(&mut self, value: &ArrayD<T>);

    /// The current running estimate, or `None` before the first update.
    fn current(&self) -> Option<&ArrayD<T>>;

    /// Discard all accumulated state.
    fn reset(&mut self);
}

/// Exponential moving average with zero-debiasing.
///
/// Maintains `hidden = decay * hidden + (1 - decay) * sample` starting from
/// zero, and reports `hidden / (1 - decay^n)` after `n` updates so early
/// estimates are not biased toward zero. After a single update the reported
/// value equals the sample exactly.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage<T> {
    decay: T,
    decay_power: T,
    hidden: Option<ArrayD<T>>,
    average: Option<ArrayD<T>>,
}

impl<T> ExponentialMovingAverage<T>
where
    T: Float,
{
    /// Create a tracker with the given decay rate, which must lie in `[0, 1)`.
    pub fn new(decay: T) -> Result<Self> {
        if decay < T::zero() || decay >= T::one() {
            return Err(NormError::invalid_configuration(
                "decay rate must lie in [0, 1)",
            ));
        }
        Ok(Self {
            decay,
            decay_power: T::one(),
            hidden: None,
            average: None,
        })
    }

    /// The configured decay rate.
    pub fn decay(&self) -> T {
        self.decay
    }
}

impl<T> RunningStatistic<T> for ExponentialMovingAverage<T>
where
    T: Float + ScalarOperand,
{
    fn update(&mut self, value: &ArrayD<T>) {
        let shape_changed = self
            .hidden
            .as_ref()
            .is_some_and(|hidden| hidden.shape() != value.shape());
        if shape_changed {
            self.reset();
        }
        self.decay_power = self.decay_power * self.decay;
        let one_minus_decay = T::one() - self.decay;
        let hidden = match self.hidden.take() {
            Some(prev) => prev * self.decay + value * one_minus_decay,
            None => value * one_minus_decay,
        };
        let debias = T::one() - self.decay_power;
        self.average = Some(hidden.mapv(|h| h / debias));
        self.hidden = Some(hidden);
    }

    fn current(&self) -> Option<&ArrayD<T>> {
        self.average.as_ref()
    }

    fn reset(&mut self) {
        self.decay_power = T::one();
        self.hidden = None;
        self.average = None;
    }
}

/// Arithmetic mean over every sample seen so far.
#[derive(Debug, Clone)]
pub struct CumulativeAverage<T> {
    count: T,
    mean: Option<ArrayD<T>>,
}

impl<T> CumulativeAverage<T>
where
    T: Float,
{
    pub fn new() -> Self {
        Self {
            count: T::zero(),
            mean: None,
        }
    }
}

impl<T> Default for CumulativeAverage<T>
where
    T: Float,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RunningStatistic<T> for CumulativeAverage<T>
where
    T: Float + ScalarOperand,
{
    fn update(&mut self, value: &ArrayD<T>) {
        let shape_changed = self
            .mean
            .as_ref()
            .is_some_and(|mean| mean.shape() != value.shape());
        if shape_changed {
            self.reset();
        }
        self.count = self.count + T::one();
        self.mean = Some(match self.mean.take() {
            Some(prev) => {
                let delta = (value - &prev) / self.count;
                prev + delta
            }
            None => value.clone(),
        });
    }

    fn current(&self) -> Option<&ArrayD<T>> {
        self.mean.as_ref()
    }

    fn reset(&mut self) {
        self.count = T::zero();
        self.mean = None;
    }
}

/// Keeps the most recent sample verbatim.
#[derive(Debug, Clone, Default)]
pub struct LatestValue<T> {
    value: Option<ArrayD<T>>,
}

impl<T> LatestValue<T> {
    pub fn new() -> Self {
        Self { value: None }
    }
}

impl<T> RunningStatistic<T> for LatestValue<T>
where
    T: Clone,
{
    fn update(&mut self, value: &ArrayD<T>) {
        self.value = Some(value.clone());
    }

    fn current(&self) -> Option<&ArrayD<T>> {
        self.value.as_ref()
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn sample(value: f64) -> ArrayD<f64> {
        ArrayD::from_elem(IxDyn(&[1, 2]), value)
    }

    #[test]
    fn test_ema_rejects_bad_decay() {
        assert!(ExponentialMovingAverage::new(1.0f64).is_err());
        assert!(ExponentialMovingAverage::new(-0.1f64).is_err());
        assert!(ExponentialMovingAverage::new(0.999f64).is_ok());
    }

    #[test]
    fn test_ema_first_update_is_unbiased() {
        let mut ema = ExponentialMovingAverage::new(0.999f64).unwrap();
        assert!(ema.current().is_none());

        ema.update(&sample(2.0));
        let current = ema.current().unwrap();
        assert!(current.iter().all(|&v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_ema_debiased_second_update() {
        let mut ema = ExponentialMovingAverage::new(0.9f64).unwrap();
        ema.update(&sample(2.0));
        ema.update(&sample(4.0));

        // hidden = 0.9 * 0.2 + 0.1 * 4 = 0.58, debias = 1 - 0.81 = 0.19
        let expected = 0.58 / 0.19;
        let current = ema.current().unwrap();
        assert!(current.iter().all(|&v| (v - expected).abs() < 1e-12));
    }

    #[test]
    fn test_ema_shape_change_reinitializes() {
        let mut ema = ExponentialMovingAverage::new(0.9f64).unwrap();
        ema.update(&sample(2.0));

        let wider = ArrayD::from_elem(IxDyn(&[1, 3]), 5.0f64);
        ema.update(&wider);
        let current = ema.current().unwrap();
        assert_eq!(current.shape(), &[1, 3]);
        assert!(current.iter().all(|&v| (v - 5.0).abs() < 1e-12));
    }

    #[test]
    fn test_cumulative_average() {
        let mut avg = CumulativeAverage::new();
        avg.update(&sample(2.0));
        avg.update(&sample(4.0));

        let current = avg.current().unwrap();
        assert!(current.iter().all(|&v| (v - 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_latest_value() {
        let mut latest = LatestValue::new();
        latest.update(&sample(2.0));
        latest.update(&sample(4.0));

        let current = latest.current().unwrap();
        assert!(current.iter().all(|&v| v == 4.0));

        latest.reset();
        assert!(latest.current().is_none());
    }
}
