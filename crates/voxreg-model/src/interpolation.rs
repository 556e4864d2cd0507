use burn::tensor::{backend::Backend, Int, Tensor};

/// Trilinear sampling of a volume at arbitrary voxel coordinates.
///
/// # Arguments
/// * `volume` - Source volume [B, C, X', Y', Z']
/// * `grid` - Sampling coordinates [B, 3, X, Y, Z] in voxel units of `volume`,
///   channel k indexing spatial axis k
///
/// # Returns
/// * Sampled volume [B, C, X, Y, Z]
///
/// Corner indices are clamped to the volume while the weights come from the
/// unclamped coordinates, so any point outside the volume takes the value of
/// the nearest border voxel. Gradients flow to `volume` through the gather and
/// to `grid` through the weights.
pub fn trilinear_sample<B: Backend>(volume: Tensor<B, 5>, grid: Tensor<B, 5>) -> Tensor<B, 5> {
    let [b, c, sx, sy, sz] = volume.dims();
    let [_, _, x, y, z] = grid.dims();

    let px = grid.clone().slice([0..b, 0..1, 0..x, 0..y, 0..z]);
    let py = grid.clone().slice([0..b, 1..2, 0..x, 0..y, 0..z]);
    let pz = grid.slice([0..b, 2..3, 0..x, 0..y, 0..z]);

    let x0 = px.clone().floor();
    let y0 = py.clone().floor();
    let z0 = pz.clone().floor();

    // Weights
    let wx1 = px.sub(x0.clone());
    let wx0 = wx1.clone().neg().add_scalar(1.0);
    let wy1 = py.sub(y0.clone());
    let wy0 = wy1.clone().neg().add_scalar(1.0);
    let wz1 = pz.sub(z0.clone());
    let wz0 = wz1.clone().neg().add_scalar(1.0);

    // NaN cannot be cast to an index; the weights still carry it to the output.
    let corner = |low: Tensor<B, 5>, size: usize| -> (Tensor<B, 5, Int>, Tensor<B, 5, Int>) {
        let max = (size - 1) as f32;
        let low = low.clone().mask_fill(low.is_nan(), 0.0);
        let high = low.clone().add_scalar(1.0).clamp(0.0, max).int();
        (low.clamp(0.0, max).int(), high)
    };
    let (x0_idx, x1_idx) = corner(x0, sx);
    let (y0_idx, y1_idx) = corner(y0, sy);
    let (z0_idx, z1_idx) = corner(z0, sz);

    // Flatten volume once: [B, C, X'*Y'*Z']
    let flat = volume.reshape([b, c, sx * sy * sz]);

    let stride_x = (sy * sz) as i32;
    let stride_y = sz as i32;
    let x0_off = x0_idx.mul_scalar(stride_x);
    let x1_off = x1_idx.mul_scalar(stride_x);
    let y0_off = y0_idx.mul_scalar(stride_y);
    let y1_off = y1_idx.mul_scalar(stride_y);

    let n = x * y * z;
    let gather = |idx: Tensor<B, 5, Int>| -> Tensor<B, 5> {
        let idx = idx.reshape([b, 1, n]).repeat(&[1, c, 1]);
        flat.clone().gather(2, idx).reshape([b, c, x, y, z])
    };

    let idx_00 = x0_off.clone() + y0_off.clone();
    let idx_01 = x0_off + y1_off.clone();
    let idx_10 = x1_off.clone() + y0_off;
    let idx_11 = x1_off + y1_off;

    let v000 = gather(idx_00.clone() + z0_idx.clone());
    let v001 = gather(idx_00 + z1_idx.clone());
    let v010 = gather(idx_01.clone() + z0_idx.clone());
    let v011 = gather(idx_01 + z1_idx.clone());
    let v100 = gather(idx_10.clone() + z0_idx.clone());
    let v101 = gather(idx_10 + z1_idx.clone());
    let v110 = gather(idx_11.clone() + z0_idx);
    let v111 = gather(idx_11 + z1_idx);

    // Interpolate z first
    let c00 = v000 * wz0.clone() + v001 * wz1.clone();
    let c01 = v010 * wz0.clone() + v011 * wz1.clone();
    let c10 = v100 * wz0.clone() + v101 * wz1.clone();
    let c11 = v110 * wz0 + v111 * wz1;

    // Then y
    let c0 = c00 * wy0.clone() + c01 * wy1.clone();
    let c1 = c10 * wy0 + c11 * wy1;

    // Then x
    c0 * wx0 + c1 * wx1
}

/// Voxel-index grid [1, 3, X, Y, Z] for a spatial shape.
///
/// Built from broadcastable ranges so callers can add a displacement field
/// without materializing the batch dimension.
pub fn identity_grid<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 5> {
    let [x, y, z] = shape;

    let gx = Tensor::<B, 1, Int>::arange(0..x as i64, device)
        .float()
        .reshape([1, 1, x, 1, 1])
        .repeat(&[1, 1, 1, y, z]);
    let gy = Tensor::<B, 1, Int>::arange(0..y as i64, device)
        .float()
        .reshape([1, 1, 1, y, 1])
        .repeat(&[1, 1, x, 1, z]);
    let gz = Tensor::<B, 1, Int>::arange(0..z as i64, device)
        .float()
        .reshape([1, 1, 1, 1, z])
        .repeat(&[1, 1, x, y, 1]);

    Tensor::cat(vec![gx, gy, gz], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn ramp(shape: [usize; 3], device: &<B as Backend>::Device) -> Tensor<B, 5> {
        let [x, y, z] = shape;
        let mut values = Vec::with_capacity(x * y * z);
        for i in 0..x {
            for j in 0..y {
                for k in 0..z {
                    values.push((i * 100 + j * 10 + k) as f32);
                }
            }
        }
        Tensor::from_data(TensorData::new(values, [1, 1, x, y, z]), device)
    }

    #[test]
    fn test_identity_grid_samples_exactly() {
        let device = Default::default();
        let volume = ramp([3, 4, 5], &device);
        let grid = identity_grid::<B>([3, 4, 5], &device);

        let sampled = trilinear_sample(volume.clone(), grid);
        let diff: f32 = (sampled - volume).abs().max().into_scalar();
        assert!(diff < 1e-4, "max diff {diff}");
    }

    #[test]
    fn test_half_voxel_is_average() {
        let device = Default::default();
        let volume = ramp([2, 2, 2], &device);
        // Single sample at the centre of the cube.
        let grid = Tensor::<B, 5>::full([1, 3, 1, 1, 1], 0.5, &device);

        let value: f32 = trilinear_sample(volume, grid).into_scalar();
        // Mean of i*100 + j*10 + k over the 8 corners.
        assert!((value - 55.5).abs() < 1e-4, "got {value}");
    }

    #[test]
    fn test_out_of_bounds_clamps_to_border() {
        let device = Default::default();
        let volume = ramp([4, 1, 1], &device);
        let coords = TensorData::new(vec![-3.0f32, 0.0, 0.0, 9.5, 0.0, 0.0], [2, 3, 1, 1, 1]);
        let volume = volume.repeat(&[2, 1, 1, 1, 1]);
        let grid = Tensor::<B, 5>::from_data(coords, &device);

        let values: Vec<f32> = trilinear_sample(volume, grid).into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.0, 300.0]);
    }

    #[test]
    fn test_sample_smaller_output_grid() {
        let device = Default::default();
        let volume = ramp([4, 4, 4], &device);
        let grid = identity_grid::<B>([2, 2, 2], &device).mul_scalar(2.0);

        let sampled = trilinear_sample(volume, grid);
        assert_eq!(sampled.dims(), [1, 1, 2, 2, 2]);
        let values: Vec<f32> = sampled.into_data().to_vec().unwrap();
        assert_eq!(values[7], 222.0);
    }
}
