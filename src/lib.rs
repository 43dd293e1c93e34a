//! # TenNorm
//!
//! TenNorm is a batch-normalization engine for n-dimensional `ndarray`
//! tensors. It normalizes activations per channel using fresh batch
//! statistics while training and accumulated running statistics at
//! inference time, with the channel axis inferred from a data-format
//! descriptor such as `"NHWC"` or `"NCHW"`.
//!
//! ## Features
//!
//! - **Data-format aware**: channel-first and channel-last layouts of any
//!   rank >= 2, resolved once at construction (fail fast on bad formats)
//! - **Pluggable running statistics**: the [`RunningStatistic`] trait lets
//!   callers swap the moving-average policy; exponential, cumulative, and
//!   latest-value trackers ship in the box
//! - **Three statistics modes**: training, inference, and inference with
//!   test-local statistics that never touch the running estimates
//! - **Optional learned affine**: layer-owned scale/offset parameters with
//!   pluggable initializers, or per-call tensors, or identity defaults
//!
//! ## Quick Start
//!
//! ```
//! use ndarray::{ArrayD, IxDyn};
//! use tennorm::BatchNorm;
//!
//! # fn main() -> tennorm::Result<()> {
//! let layer = BatchNorm::<f32>::new(true, true)?.with_data_format("NHWC")?;
//!
//! let input = ArrayD::from_elem(IxDyn(&[2, 3, 3, 5]), 1.0);
//! // Training pass: batch statistics, running estimates updated.
//! layer.forward(&input, true, false, None, None)?;
//! // Inference pass: running estimates, no update.
//! let output = layer.forward(&input, false, false, None, None)?;
//! # assert_eq!(output.shape(), &[2, 3, 3, 5]);
//! # Ok(())
//! # }
//! ```

pub mod batch_norm;
pub mod data_format;
pub mod error;
pub mod initializers;
pub mod moving;
pub mod stats;

pub use batch_norm::{BaseBatchNorm, BatchNorm, StatsMode};
pub use data_format::{channel_index, CHANNELS_FIRST, CHANNELS_LAST};
pub use error::{NormError, Result};
pub use initializers::{Constant, Initializer, Ones, Zeros};
pub use moving::{CumulativeAverage, ExponentialMovingAverage, LatestValue, RunningStatistic};
pub use stats::batch_moments;
