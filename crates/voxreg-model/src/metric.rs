//! Evaluation metrics on binarized label masks.
//!
//! Predictions and ground truth are thresholded at 0.5 before scoring, so the
//! metrics carry no gradient.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use crate::interpolation::identity_grid;
use crate::loss::dice_score;

/// Binarization threshold.
pub const FOREGROUND_THRESHOLD: f64 = 0.5;

const EPSILON: f32 = 1e-6;

fn binarize<B: Backend>(mask: Tensor<B, 4>) -> Tensor<B, 4> {
    mask.greater_elem(FOREGROUND_THRESHOLD).float()
}

/// Hard Dice overlap averaged over the batch.
pub fn mean_dice<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    dice_score(binarize(y_true), binarize(y_pred)).mean()
}

/// Foreground centroid [B, 3] in voxel coordinates of `grid_size`.
pub fn centroid<B: Backend>(mask: Tensor<B, 4>, grid_size: [usize; 3]) -> Tensor<B, 2> {
    let [b, x, y, z] = mask.dims();
    let grid = identity_grid::<B>(grid_size, &mask.device());
    let mask = binarize(mask).unsqueeze_dim::<5>(1);

    let weighted = (grid * mask.clone()).reshape([b, 3, x * y * z]).sum_dim(2);
    let total = mask.reshape([b, 1, x * y * z]).sum_dim(2).add_scalar(EPSILON);
    (weighted / total).reshape([b, 3])
}

/// Euclidean distance between foreground centroids, averaged over the batch.
pub fn mean_centroid_distance<B: Backend>(
    y_true: Tensor<B, 4>,
    y_pred: Tensor<B, 4>,
    grid_size: [usize; 3],
) -> Tensor<B, 1> {
    let diff = centroid(y_true, grid_size) - centroid(y_pred, grid_size);
    diff.powf_scalar(2.0).sum_dim(1).sqrt().mean()
}

/// Fraction of voxels above the threshold, averaged over the batch.
pub fn mean_foreground_proportion<B: Backend>(mask: Tensor<B, 4>) -> Tensor<B, 1> {
    binarize(mask).mean()
}

/// Named metric values reported per step.
#[derive(Debug, Clone)]
pub struct MetricBundle<B: Backend> {
    pub terms: Vec<(String, Tensor<B, 1>)>,
}

impl<B: Backend> MetricBundle<B> {
    pub const DICE: &'static str = "metric/dice";
    pub const CENTROID_DISTANCE: &'static str = "metric/centroid_distance";
    pub const FOREGROUND_TRUE: &'static str = "metric/foreground_true";
    pub const FOREGROUND_PRED: &'static str = "metric/foreground_pred";

    /// Score a predicted fixed label against the ground truth.
    pub fn compute(fixed_label: Tensor<B, 4>, pred_fixed_label: Tensor<B, 4>, grid_size: [usize; 3]) -> Self {
        let terms = vec![
            (
                Self::DICE.to_string(),
                mean_dice(fixed_label.clone(), pred_fixed_label.clone()),
            ),
            (
                Self::CENTROID_DISTANCE.to_string(),
                mean_centroid_distance(fixed_label.clone(), pred_fixed_label.clone(), grid_size),
            ),
            (
                Self::FOREGROUND_TRUE.to_string(),
                mean_foreground_proportion(fixed_label),
            ),
            (
                Self::FOREGROUND_PRED.to_string(),
                mean_foreground_proportion(pred_fixed_label),
            ),
        ];
        Self { terms }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor<B, 1>> {
        self.terms.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Host-side values, in insertion order.
    pub fn to_scalars(&self) -> Vec<(String, f64)> {
        self.terms
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into_scalar().elem::<f64>()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn cube(shape: [usize; 3], lo: [usize; 3], hi: [usize; 3]) -> Tensor<TestBackend, 4> {
        let [x, y, z] = shape;
        let mut values = Vec::with_capacity(x * y * z);
        for i in 0..x {
            for j in 0..y {
                for k in 0..z {
                    let inside = [i, j, k].iter().zip(lo.iter().zip(hi)).all(|(&v, (&l, h))| v >= l && v < h);
                    values.push(if inside { 0.9f32 } else { 0.1 });
                }
            }
        }
        Tensor::from_data(TensorData::new(values, [1, x, y, z]), &Default::default())
    }

    #[test]
    fn test_identical_masks() {
        let mask = cube([6, 6, 6], [1, 1, 1], [3, 3, 3]);
        let metrics = MetricBundle::compute(mask.clone(), mask, [6, 6, 6]);
        let values = metrics.to_scalars();

        assert_eq!(values[0].0, "metric/dice");
        assert!((values[0].1 - 1.0).abs() < 1e-5);
        assert!(values[1].1.abs() < 1e-4);
        assert!((values[2].1 - 8.0 / 216.0).abs() < 1e-6);
        assert_eq!(values[2].1, values[3].1);
    }

    #[test]
    fn test_shifted_cube_centroid_distance() {
        let a = cube([8, 8, 8], [0, 0, 0], [2, 2, 2]);
        let b = cube([8, 8, 8], [3, 0, 0], [5, 2, 2]);

        let distance: f32 = mean_centroid_distance(a.clone(), b.clone(), [8, 8, 8]).into_scalar();
        assert!((distance - 3.0).abs() < 1e-4, "{distance}");

        let dice: f32 = mean_dice(a, b).into_scalar();
        assert!(dice < 1e-5);
    }

    #[test]
    fn test_centroid_location() {
        let mask = cube([4, 4, 4], [2, 0, 1], [4, 1, 2]);
        let c: Vec<f32> = centroid(mask, [4, 4, 4]).into_data().to_vec().unwrap();
        assert!((c[0] - 2.5).abs() < 1e-5);
        assert!(c[1].abs() < 1e-5);
        assert!((c[2] - 1.0).abs() < 1e-5);
    }
}
