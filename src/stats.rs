//! Batch statistics engine
//!
//! Computes per-channel mean and population variance over every axis except
//! the channel axis, keeping reduced axes at size 1 so the results broadcast
//! directly against the input.

use ndarray::{ArrayD, Axis, IxDyn};
use num_traits::{Float, FromPrimitive};

use crate::data_format::resolve_axis;
use crate::error::{NormError, Result};

/// Compute per-channel batch mean and variance with kept dimensions.
///
/// Reduction runs over every axis of `input` except the channel axis, which
/// may be given as a negative index counting from the back. Variance is the
/// population variance `E[(x - mean)^2]` (divisor is the reduced element
/// count, not count - 1).
///
/// The returned arrays share the input's rank, with size 1 on all reduced
/// axes and the full channel extent on the channel axis.
pub fn batch_moments<T>(input: &ArrayD<T>, channel_index: isize) -> Result<(ArrayD<T>, ArrayD<T>)>
where
    T: Float + FromPrimitive,
{
    let rank = input.ndim();
    if rank < 2 {
        return Err(NormError::shape_mismatch(
            "batch_moments",
            "input of rank >= 2",
            &format!("rank {rank}"),
        ));
    }

    let channel = resolve_axis(channel_index, rank);
    let reduced_count: usize = input
        .shape()
        .iter()
        .enumerate()
        .filter(|(axis, _)| *axis != channel)
        .map(|(_, &dim)| dim)
        .product();
    if reduced_count == 0 {
        return Err(NormError::shape_mismatch(
            "batch_moments",
            "non-empty reduction axes",
            &format!("{:?}", input.shape()),
        ));
    }
    let count = T::from_usize(reduced_count).ok_or_else(|| {
        NormError::shape_mismatch(
            "batch_moments",
            "a reduction count representable in the element type",
            &reduced_count.to_string(),
        )
    })?;

    let mean = reduce_mean(input, channel, count)?;
    let centered = input - &mean;
    let variance = reduce_mean(&(&centered * &centered), channel, count)?;
    Ok((mean, variance))
}

/// Mean over all non-channel axes, reshaped back to the keep-dims shape.
fn reduce_mean<T>(input: &ArrayD<T>, channel: usize, count: T) -> Result<ArrayD<T>>
where
    T: Float,
{
    let rank = input.ndim();
    let mut keep_shape = vec![1usize; rank];
    keep_shape[channel] = input.len_of(Axis(channel));

    // Fold axes from the back so earlier indices stay valid while reducing.
    let mut acc = input.to_owned();
    for axis in (0..rank).rev() {
        if axis != channel {
            acc = acc.sum_axis(Axis(axis));
        }
    }
    let summed = acc.into_shape_with_order(IxDyn(&keep_shape))?;
    Ok(summed.mapv(|v| v / count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_moments_rank_two_channels_last() {
        let input = arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn();
        let (mean, variance) = batch_moments(&input, -1).unwrap();

        assert_eq!(mean.shape(), &[1, 2]);
        assert_eq!(mean.as_slice().unwrap(), &[2.0, 3.0]);
        assert_eq!(variance.shape(), &[1, 2]);
        assert_eq!(variance.as_slice().unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_moments_constant_input_nhwc() {
        let input = ArrayD::from_elem(IxDyn(&[2, 3, 3, 5]), 1.0f32);
        let (mean, variance) = batch_moments(&input, -1).unwrap();

        assert_eq!(mean.shape(), &[1, 1, 1, 5]);
        assert!(mean.iter().all(|&m| m == 1.0));
        assert!(variance.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_moments_channels_first() {
        let input = ArrayD::from_elem(IxDyn(&[2, 5, 3, 3]), 4.0f64);
        let (mean, variance) = batch_moments(&input, 1).unwrap();

        assert_eq!(mean.shape(), &[1, 5, 1, 1]);
        assert!(mean.iter().all(|&m| m == 4.0));
        assert!(variance.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_moments_population_variance() {
        // Per channel 0: values 0 and 2 -> mean 1, population variance 1
        // (sample variance would be 2).
        let input = arr2(&[[0.0f64, 10.0], [2.0, 10.0]]).into_dyn();
        let (mean, variance) = batch_moments(&input, -1).unwrap();

        assert_eq!(mean.as_slice().unwrap(), &[1.0, 10.0]);
        assert_eq!(variance.as_slice().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_moments_negative_and_positive_axis_agree() {
        let input = arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn();
        let (mean_neg, var_neg) = batch_moments(&input, -1).unwrap();
        let (mean_pos, var_pos) = batch_moments(&input, 1).unwrap();

        assert_eq!(mean_neg, mean_pos);
        assert_eq!(var_neg, var_pos);
    }

    #[test]
    fn test_moments_rejects_rank_one() {
        let input = ArrayD::from_elem(IxDyn(&[4]), 1.0f32);
        let err = batch_moments(&input, -1).unwrap_err();
        assert!(matches!(err, NormError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_moments_rejects_empty_batch() {
        let input = ArrayD::<f32>::zeros(IxDyn(&[0, 3]));
        let err = batch_moments(&input, -1).unwrap_err();
        assert!(matches!(err, NormError::ShapeMismatch { .. }));
    }
}
