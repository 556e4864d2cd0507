use burn::{
    module::{Ignored, Module},
    tensor::{backend::Backend, Tensor},
};
use std::marker::PhantomData;

use crate::error::{ModelError, Result};
use crate::interpolation::{identity_grid, trilinear_sample};

/// Warp `volume` [B, C, X', Y', Z'] by a displacement field `ddf` [B, 3, X, Y, Z].
///
/// `out[b, :, i, j, k] = volume[b, :, (i, j, k) + ddf[b, :, i, j, k]]`,
/// sampled trilinearly with border clamping. The output takes the spatial
/// shape of the field.
pub fn warp<B: Backend>(ddf: Tensor<B, 5>, volume: Tensor<B, 5>) -> Tensor<B, 5> {
    let [_, _, x, y, z] = ddf.dims();
    let grid = identity_grid::<B>([x, y, z], &ddf.device()) + ddf;
    trilinear_sample(volume, grid)
}

/// Warping layer bound to a fixed output shape.
///
/// Rejects fields whose spatial shape differs from the configured fixed image
/// shape before any sampling happens.
#[derive(Module, Debug)]
pub struct Warping<B: Backend> {
    fixed_image_size: Ignored<[usize; 3]>,
    phantom: PhantomData<B>,
}

impl<B: Backend> Warping<B> {
    pub fn new(fixed_image_size: [usize; 3]) -> Self {
        Self {
            fixed_image_size: Ignored(fixed_image_size),
            phantom: PhantomData,
        }
    }

    /// Warp a single-channel volume [B, X', Y', Z'].
    pub fn forward(&self, ddf: Tensor<B, 5>, volume: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self.check_field(&ddf)?;
        let [batch, ..] = ddf.dims();
        let [volume_batch, ..] = volume.dims();
        if volume_batch != batch {
            return Err(ModelError::shape_mismatch("warped volume batch", &[batch], &[volume_batch]));
        }
        Ok(warp(ddf, volume.unsqueeze_dim::<5>(1)).squeeze::<4>(1))
    }

    fn check_field(&self, ddf: &Tensor<B, 5>) -> Result<()> {
        let [b, c, x, y, z] = ddf.dims();
        let [fx, fy, fz] = *self.fixed_image_size;
        if c != 3 || [x, y, z] != [fx, fy, fz] {
            return Err(ModelError::shape_mismatch("ddf", &[b, 3, fx, fy, fz], &[b, c, x, y, z]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, TensorData};
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_zero_field_is_identity() {
        let device = Default::default();
        let volume = Tensor::<B, 5>::random([2, 2, 5, 6, 7], Distribution::Default, &device);
        let ddf = Tensor::<B, 5>::zeros([2, 3, 5, 6, 7], &device);

        let warped = warp(ddf, volume.clone());
        let diff: f32 = (warped - volume).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_unit_shift() {
        let device = Default::default();
        // Values equal to the x index.
        let values: Vec<f32> = (0..4).flat_map(|i| std::iter::repeat(i as f32).take(4)).collect();
        let volume = Tensor::<B, 5>::from_data(TensorData::new(values, [1, 1, 4, 2, 2]), &device);
        let shift = TensorData::new(vec![1.0f32, 0.0, 0.0], [1, 3, 1, 1, 1]);
        let ddf = Tensor::<B, 5>::from_data(shift, &device).repeat(&[1, 1, 4, 2, 2]);

        let warped: Vec<f32> = warp(ddf, volume).into_data().to_vec().unwrap();
        // x + 1, clamped at the last slice.
        assert_eq!(&warped[0..4], &[1.0; 4]);
        assert_eq!(&warped[12..16], &[3.0; 4]);
    }

    #[test]
    fn test_nan_field_propagates() {
        let device = Default::default();
        let volume = Tensor::<B, 5>::ones([1, 1, 4, 4, 4], &device);
        let ddf = Tensor::<B, 5>::zeros([1, 3, 4, 4, 4], &device).mul_scalar(f32::NAN);

        let warped: Vec<f32> = warp(ddf, volume).into_data().to_vec().unwrap();
        assert_eq!(warped.len(), 64);
        assert!(warped.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_warping_rejects_wrong_shape() {
        let device = Default::default();
        let warping = Warping::<B>::new([4, 4, 4]);
        let ddf = Tensor::<B, 5>::zeros([1, 3, 4, 4, 5], &device);
        let volume = Tensor::<B, 4>::zeros([1, 4, 4, 5], &device);
        let err = warping.forward(ddf, volume).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
