//! Parameter initialization policies
//!
//! An [`Initializer`] produces the starting value for a layer-owned
//! parameter. The layer invokes it exactly once, at first creation of the
//! parameter, with the channel shape broadcast to the input's rank.

use ndarray::{ArrayD, IxDyn};
use num_traits::{One, Zero};

/// Produces the initial value of an owned parameter for a target shape.
pub trait Initializer<T> {
    fn initialize(&self, shape: &[usize]) -> ArrayD<T>;
}

/// Fills the parameter with ones (the default for scale parameters).
#[derive(Debug, Clone, Copy, Default)]
pub struct Ones;

impl<T> Initializer<T> for Ones
where
    T: Clone + One,
{
    fn initialize(&self, shape: &[usize]) -> ArrayD<T> {
        ArrayD::ones(IxDyn(shape))
    }
}

/// Fills the parameter with zeros (the default for offset parameters).
#[derive(Debug, Clone, Copy, Default)]
pub struct Zeros;

impl<T> Initializer<T> for Zeros
where
    T: Clone + Zero,
{
    fn initialize(&self, shape: &[usize]) -> ArrayD<T> {
        ArrayD::zeros(IxDyn(shape))
    }
}

/// Fills the parameter with a fixed constant.
#[derive(Debug, Clone, Copy)]
pub struct Constant<T>(pub T);

impl<T> Initializer<T> for Constant<T>
where
    T: Clone,
{
    fn initialize(&self, shape: &[usize]) -> ArrayD<T> {
        ArrayD::from_elem(IxDyn(shape), self.0.clone())
    }
}
