//! Batch normalization core and layer facade
//!
//! [`BaseBatchNorm`] composes the data-format resolver, the batch statistics
//! engine, and a pair of injected running-statistics trackers into the full
//! train/eval normalization layer. [`BatchNorm`] is the convenience facade
//! that wires exponential-moving-average trackers in for the common case.
//!
//! The layer normalizes per channel:
//!
//! ```text
//! output = (input - mean) / sqrt(variance + eps) * scale + offset
//! ```
//!
//! using fresh batch statistics while training and tracked running
//! statistics at inference time.

use std::cell::RefCell;

use ndarray::{ArrayD, IxDyn, ScalarOperand};
use num_traits::{Float, FromPrimitive};

use crate::data_format::{channel_index, resolve_axis, CHANNELS_LAST};
use crate::error::{NormError, Result};
use crate::initializers::{Initializer, Ones, Zeros};
use crate::moving::{ExponentialMovingAverage, RunningStatistic};
use crate::stats::batch_moments;

const DEFAULT_EPS: f64 = 1e-5;
const DEFAULT_DECAY_RATE: f64 = 0.999;

/// Which statistics a forward pass normalizes with.
///
/// Only the `Training` variant may push fresh batch statistics into the
/// trackers; the other two never mutate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsMode {
    /// Fresh batch statistics, pushed into the trackers.
    Training,
    /// Tracked running statistics, read-only.
    Inference,
    /// Fresh batch statistics over the current batch only, with no tracker
    /// update. Supports evaluating a held-out batch without contaminating
    /// the running estimates.
    InferenceLocalStats,
}

impl StatsMode {
    /// Map the call-contract flags onto a mode. `test_local_stats` only
    /// matters when `is_training` is false.
    pub fn from_flags(is_training: bool, test_local_stats: bool) -> Self {
        if is_training {
            StatsMode::Training
        } else if test_local_stats {
            StatsMode::InferenceLocalStats
        } else {
            StatsMode::Inference
        }
    }
}

/// Batch normalization over a data-format-described channel axis, with the
/// running-statistics policy injected as a pair of trackers.
///
/// Configuration is fixed at construction; the only state mutated across
/// calls is the tracker pair (training passes only) and the one-time lazy
/// creation of owned scale/offset parameters, both behind [`RefCell`] so
/// forward passes take `&self`.
pub struct BaseBatchNorm<T, M> {
    data_format: String,
    channel_index: isize,
    eps: T,
    create_scale: bool,
    create_offset: bool,
    scale_init: Option<Box<dyn Initializer<T>>>,
    offset_init: Option<Box<dyn Initializer<T>>>,
    scale: RefCell<Option<ArrayD<T>>>,
    offset: RefCell<Option<ArrayD<T>>>,
    moving_mean: RefCell<M>,
    moving_variance: RefCell<M>,
}

impl<T, M> std::fmt::Debug for BaseBatchNorm<T, M>
where
    T: std::fmt::Debug,
    M: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseBatchNorm")
            .field("data_format", &self.data_format)
            .field("channel_index", &self.channel_index)
            .field("eps", &self.eps)
            .field("create_scale", &self.create_scale)
            .field("create_offset", &self.create_offset)
            .field("scale", &self.scale)
            .field("offset", &self.offset)
            .field("moving_mean", &self.moving_mean)
            .field("moving_variance", &self.moving_variance)
            .finish_non_exhaustive()
    }
}

impl<T, M> BaseBatchNorm<T, M>
where
    T: Float + FromPrimitive + ScalarOperand,
    M: RunningStatistic<T>,
{
    /// Create a layer with injected mean/variance trackers.
    ///
    /// Defaults: data format [`CHANNELS_LAST`], epsilon `1e-5`, no owned
    /// parameters unless `create_scale` / `create_offset` request them.
    pub fn new(moving_mean: M, moving_variance: M, create_scale: bool, create_offset: bool) -> Self {
        Self {
            data_format: CHANNELS_LAST.to_string(),
            channel_index: -1,
            eps: T::from_f64(DEFAULT_EPS).unwrap_or_else(T::epsilon),
            create_scale,
            create_offset,
            scale_init: None,
            offset_init: None,
            scale: RefCell::new(None),
            offset: RefCell::new(None),
            moving_mean: RefCell::new(moving_mean),
            moving_variance: RefCell::new(moving_variance),
        }
    }

    /// Set the data format, resolving the channel axis immediately.
    ///
    /// An unrecognized descriptor fails here, at construction, not at the
    /// first forward call.
    pub fn with_data_format(mut self, data_format: &str) -> Result<Self> {
        self.channel_index = channel_index(data_format)?;
        self.data_format = data_format.to_string();
        Ok(self)
    }

    /// Set the epsilon added to the variance before the square root.
    pub fn with_eps(mut self, eps: T) -> Self {
        self.eps = eps;
        self
    }

    /// Set the initializer for the owned scale parameter.
    ///
    /// Only valid when the layer was built with `create_scale = true`.
    pub fn with_scale_init(mut self, scale_init: Box<dyn Initializer<T>>) -> Result<Self> {
        if !self.create_scale {
            return Err(NormError::invalid_configuration(
                "Cannot set `scale_init` if `create_scale=False`",
            ));
        }
        self.scale_init = Some(scale_init);
        Ok(self)
    }

    /// Set the initializer for the owned offset parameter.
    ///
    /// Only valid when the layer was built with `create_offset = true`.
    pub fn with_offset_init(mut self, offset_init: Box<dyn Initializer<T>>) -> Result<Self> {
        if !self.create_offset {
            return Err(NormError::invalid_configuration(
                "Cannot set `offset_init` if `create_offset=False`",
            ));
        }
        self.offset_init = Some(offset_init);
        Ok(self)
    }

    /// The resolved channel-axis index (-1 or 1).
    pub fn channel_index(&self) -> isize {
        self.channel_index
    }

    /// The configured data-format descriptor.
    pub fn data_format(&self) -> &str {
        &self.data_format
    }

    /// Run the layer with the boolean call contract.
    ///
    /// `test_local_stats` selects fresh batch statistics without a tracker
    /// update and only applies when `is_training` is false. Per-call
    /// `scale` / `offset` take precedence over owned parameters; when
    /// neither exists they default to the multiplicative/additive identity.
    pub fn forward(
        &self,
        input: &ArrayD<T>,
        is_training: bool,
        test_local_stats: bool,
        scale: Option<&ArrayD<T>>,
        offset: Option<&ArrayD<T>>,
    ) -> Result<ArrayD<T>> {
        self.apply(
            input,
            StatsMode::from_flags(is_training, test_local_stats),
            scale,
            offset,
        )
    }

    /// Run the layer with an explicit statistics mode.
    pub fn apply(
        &self,
        input: &ArrayD<T>,
        mode: StatsMode,
        scale: Option<&ArrayD<T>>,
        offset: Option<&ArrayD<T>>,
    ) -> Result<ArrayD<T>> {
        let rank = input.ndim();
        if rank < 2 {
            return Err(NormError::shape_mismatch(
                "batch_norm",
                "input of rank >= 2",
                &format!("rank {rank}"),
            ));
        }
        let channel = resolve_axis(self.channel_index, rank);
        let channels = input.len_of(ndarray::Axis(channel));

        let (mean, variance) = self.moments(input, mode, rank, channel, channels)?;
        ensure_broadcastable("batch_norm/mean", &mean, input)?;
        ensure_broadcastable("batch_norm/variance", &variance, input)?;

        self.ensure_created_params(&self.param_shape(rank, channels));

        let eps = self.eps;
        let inv_stddev = variance.mapv(|v| T::one() / (v + eps).sqrt());
        let mut output = (input - &mean) * &inv_stddev;

        let owned_scale = self.scale.borrow();
        if let Some(scale) = scale.or(owned_scale.as_ref()) {
            ensure_broadcastable("batch_norm/scale", scale, input)?;
            output = output * scale;
        }

        let owned_offset = self.offset.borrow();
        if let Some(offset) = offset.or(owned_offset.as_ref()) {
            ensure_broadcastable("batch_norm/offset", offset, input)?;
            output = output + offset;
        }

        Ok(output)
    }

    /// Resolve the statistics for one forward pass.
    ///
    /// Exactly one `update` per tracker happens here, and only in
    /// [`StatsMode::Training`].
    fn moments(
        &self,
        input: &ArrayD<T>,
        mode: StatsMode,
        rank: usize,
        channel: usize,
        channels: usize,
    ) -> Result<(ArrayD<T>, ArrayD<T>)> {
        match mode {
            StatsMode::Training => {
                let (mean, variance) = batch_moments(input, self.channel_index)?;
                self.moving_mean.borrow_mut().update(&mean);
                self.moving_variance.borrow_mut().update(&variance);
                Ok((mean, variance))
            }
            StatsMode::InferenceLocalStats => batch_moments(input, self.channel_index),
            StatsMode::Inference => {
                let mean = self.moving_mean.borrow().current().cloned();
                let variance = self.moving_variance.borrow().current().cloned();
                match (mean, variance) {
                    (Some(mean), Some(variance)) => Ok((mean, variance)),
                    // A tracker that has never been fed falls back to the
                    // identity statistics (mean 0, variance 1).
                    _ => {
                        let mut shape = vec![1usize; rank];
                        shape[channel] = channels;
                        Ok((
                            ArrayD::zeros(IxDyn(&shape)),
                            ArrayD::ones(IxDyn(&shape)),
                        ))
                    }
                }
            }
        }
    }

    /// Shape of an owned parameter: the channel extent alone for
    /// channel-last layouts, or the channel extent followed by degenerate
    /// spatial axes for channel-first layouts.
    fn param_shape(&self, rank: usize, channels: usize) -> Vec<usize> {
        if self.channel_index == -1 {
            vec![channels]
        } else {
            let mut shape = vec![1usize; rank - 1];
            shape[0] = channels;
            shape
        }
    }

    /// Create owned parameters on first use; initializers run exactly once.
    fn ensure_created_params(&self, param_shape: &[usize]) {
        if self.create_scale {
            let mut slot = self.scale.borrow_mut();
            if slot.is_none() {
                *slot = Some(match &self.scale_init {
                    Some(init) => init.initialize(param_shape),
                    None => Ones.initialize(param_shape),
                });
            }
        }
        if self.create_offset {
            let mut slot = self.offset.borrow_mut();
            if slot.is_none() {
                *slot = Some(match &self.offset_init {
                    Some(init) => init.initialize(param_shape),
                    None => Zeros.initialize(param_shape),
                });
            }
        }
    }
}

fn ensure_broadcastable<T>(operation: &str, tensor: &ArrayD<T>, input: &ArrayD<T>) -> Result<()> {
    if tensor.broadcast(input.raw_dim()).is_none() {
        return Err(NormError::shape_mismatch(
            operation,
            &format!("a shape broadcastable against {:?}", input.shape()),
            &format!("{:?}", tensor.shape()),
        ));
    }
    Ok(())
}

/// Batch normalization with exponential-moving-average running statistics.
///
/// The common-case facade over [`BaseBatchNorm`]: both trackers are
/// zero-debiased exponential moving averages sharing one decay rate
/// (default 0.999).
pub struct BatchNorm<T> {
    inner: BaseBatchNorm<T, ExponentialMovingAverage<T>>,
}

impl<T> BatchNorm<T>
where
    T: Float + FromPrimitive + ScalarOperand,
{
    /// Create a layer with the default decay rate of 0.999.
    pub fn new(create_scale: bool, create_offset: bool) -> Result<Self> {
        let decay_rate = T::from_f64(DEFAULT_DECAY_RATE).ok_or_else(|| {
            NormError::invalid_configuration(
                "default decay rate is not representable in the element type",
            )
        })?;
        Self::with_decay_rate(create_scale, create_offset, decay_rate)
    }

    /// Create a layer with an explicit decay rate in `[0, 1)`.
    pub fn with_decay_rate(create_scale: bool, create_offset: bool, decay_rate: T) -> Result<Self> {
        let moving_mean = ExponentialMovingAverage::new(decay_rate)?;
        let moving_variance = ExponentialMovingAverage::new(decay_rate)?;
        Ok(Self {
            inner: BaseBatchNorm::new(moving_mean, moving_variance, create_scale, create_offset),
        })
    }

    pub fn with_data_format(mut self, data_format: &str) -> Result<Self> {
        self.inner = self.inner.with_data_format(data_format)?;
        Ok(self)
    }

    pub fn with_eps(mut self, eps: T) -> Self {
        self.inner = self.inner.with_eps(eps);
        self
    }

    pub fn with_scale_init(mut self, scale_init: Box<dyn Initializer<T>>) -> Result<Self> {
        self.inner = self.inner.with_scale_init(scale_init)?;
        Ok(self)
    }

    pub fn with_offset_init(mut self, offset_init: Box<dyn Initializer<T>>) -> Result<Self> {
        self.inner = self.inner.with_offset_init(offset_init)?;
        Ok(self)
    }

    pub fn channel_index(&self) -> isize {
        self.inner.channel_index()
    }

    pub fn data_format(&self) -> &str {
        self.inner.data_format()
    }

    /// See [`BaseBatchNorm::forward`].
    pub fn forward(
        &self,
        input: &ArrayD<T>,
        is_training: bool,
        test_local_stats: bool,
        scale: Option<&ArrayD<T>>,
        offset: Option<&ArrayD<T>>,
    ) -> Result<ArrayD<T>> {
        self.inner
            .forward(input, is_training, test_local_stats, scale, offset)
    }

    /// See [`BaseBatchNorm::apply`].
    pub fn apply(
        &self,
        input: &ArrayD<T>,
        mode: StatsMode,
        scale: Option<&ArrayD<T>>,
        offset: Option<&ArrayD<T>>,
    ) -> Result<ArrayD<T>> {
        self.inner.apply(input, mode, scale, offset)
    }
}
