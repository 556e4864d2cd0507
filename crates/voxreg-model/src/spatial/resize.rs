//! Shape-targeted linear resizing.
//!
//! Resizing is separable: each spatial axis is resampled by a matrix product
//! with a `[in, out]` interpolation matrix, so any ratio between input and
//! output lengths is supported, dyadic or not. Pixel centres follow the
//! half-pixel convention `src = (dst + 0.5) * in / out - 0.5`, clamped to the
//! input extent.

use burn::tensor::{backend::Backend, Tensor, TensorData};

/// Interpolation matrix `[in_len, out_len]` mapping an axis of length `in_len`
/// to `out_len` samples.
pub fn linear_resize_matrix<B: Backend>(
    in_len: usize,
    out_len: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut weights = vec![0.0f32; in_len * out_len];
    let scale = in_len as f64 / out_len as f64;
    let max = (in_len - 1) as f64;

    for dst in 0..out_len {
        let src = ((dst as f64 + 0.5) * scale - 0.5).clamp(0.0, max);
        let lo = src.floor() as usize;
        let hi = (lo + 1).min(in_len - 1);
        let frac = (src - lo as f64) as f32;
        weights[lo * out_len + dst] += 1.0 - frac;
        weights[hi * out_len + dst] += frac;
    }

    Tensor::from_data(TensorData::new(weights, [in_len, out_len]), device)
}

/// Resample the last axis of `x` to `out_len`.
fn resize_last_axis<B: Backend>(x: Tensor<B, 5>, out_len: usize) -> Tensor<B, 5> {
    let [b, c, d0, d1, in_len] = x.dims();
    if in_len == out_len {
        return x;
    }
    let matrix = linear_resize_matrix::<B>(in_len, out_len, &x.device());
    x.reshape([b * c * d0 * d1, in_len])
        .matmul(matrix)
        .reshape([b, c, d0, d1, out_len])
}

/// Resize the spatial axes of `x` [B, C, X, Y, Z] to `shape`.
pub fn resize<B: Backend>(x: Tensor<B, 5>, shape: [usize; 3]) -> Tensor<B, 5> {
    let [_, _, sx, sy, sz] = x.dims();
    if [sx, sy, sz] == shape {
        return x;
    }
    let [tx, ty, tz] = shape;

    let x = resize_last_axis(x, tz);
    let x = resize_last_axis(x.swap_dims(3, 4), ty).swap_dims(3, 4);
    resize_last_axis(x.swap_dims(2, 4), tx).swap_dims(2, 4)
}

/// Resize a single-channel volume [B, X, Y, Z].
pub fn resize_volume<B: Backend>(x: Tensor<B, 4>, shape: [usize; 3]) -> Tensor<B, 4> {
    resize(x.unsqueeze_dim::<5>(1), shape).squeeze::<4>(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_matrix_columns_sum_to_one() {
        let device = Default::default();
        let m = linear_resize_matrix::<B>(5, 3, &device);
        let sums: Vec<f32> = m.sum_dim(0).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_identity_size_is_noop() {
        let device = Default::default();
        let x = Tensor::<B, 5>::random(
            [1, 2, 3, 4, 5],
            burn::tensor::Distribution::Default,
            &device,
        );
        let y = resize(x.clone(), [3, 4, 5]);
        let diff: f32 = (y - x).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_constant_stays_constant() {
        let device = Default::default();
        let x = Tensor::<B, 5>::full([2, 1, 3, 5, 6], 2.5, &device);
        let y = resize(x, [8, 4, 7]);
        assert_eq!(y.dims(), [2, 1, 8, 4, 7]);
        let diff: f32 = y.sub_scalar(2.5).abs().max().into_scalar();
        assert!(diff < 1e-5);
    }

    #[test]
    fn test_upsample_by_two_interpolates() {
        let device = Default::default();
        // Axis values [0, 1] upsampled to 4 samples: [0, 0.25, 0.75, 1].
        let x = Tensor::<B, 5>::from_data(
            TensorData::new(vec![0.0f32, 1.0], [1, 1, 1, 1, 2]),
            &device,
        );
        let y: Vec<f32> = resize(x, [1, 1, 4]).into_data().to_vec().unwrap();
        let expected = [0.0, 0.25, 0.75, 1.0];
        for (a, e) in y.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{y:?}");
        }
    }
}
