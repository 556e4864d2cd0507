use burn::{
    module::{Ignored, Module},
    tensor::{backend::Backend, Tensor},
};
use std::marker::PhantomData;

use super::warp::warp;

/// Default number of scaling-and-squaring steps (2^7 = 128 sub-steps).
pub const DEFAULT_INTEGRATION_STEPS: usize = 7;

/// Integrate a stationary velocity field into a displacement field.
///
/// Scaling and squaring approximates $\phi = \exp(v)$:
/// 1. Scale the field by $1/2^N$
/// 2. Compose it with itself N times, $u_{k+1} = u_k + u_k \circ (x + u_k)$
///
/// Every step goes through the differentiable warp, so gradients reach the
/// velocity field through all N compositions.
pub fn integrate_velocity<B: Backend>(velocity: Tensor<B, 5>, steps: usize) -> Tensor<B, 5> {
    let scale = 0.5_f64.powi(steps as i32);
    let mut displacement = velocity.mul_scalar(scale);

    for _ in 0..steps {
        let composed = warp(displacement.clone(), displacement.clone());
        displacement = displacement + composed;
    }

    displacement
}

/// Velocity integration layer (scaling and squaring).
#[derive(Module, Debug)]
pub struct IntDvf<B: Backend> {
    steps: Ignored<usize>,
    phantom: PhantomData<B>,
}

impl<B: Backend> IntDvf<B> {
    /// # Arguments
    /// * `steps` - Number of squaring steps
    pub fn new(steps: usize) -> Self {
        Self {
            steps: Ignored(steps),
            phantom: PhantomData,
        }
    }

    pub fn steps(&self) -> usize {
        *self.steps
    }

    /// Velocity field [B, 3, X, Y, Z] to displacement field of the same shape.
    pub fn forward(&self, dvf: Tensor<B, 5>) -> Tensor<B, 5> {
        integrate_velocity(dvf, *self.steps)
    }
}

impl<B: Backend> Default for IntDvf<B> {
    fn default() -> Self {
        Self::new(DEFAULT_INTEGRATION_STEPS)
    }
}
