//! Label similarity losses on soft masks [B, X, Y, Z] with values in [0, 1].

use burn::tensor::{backend::Backend, Tensor};

use crate::config::LabelLossKind;

const EPSILON: f32 = 1e-6;

/// Per-sample sums of the true mask, predicted mask and their product.
fn overlap_sums<B: Backend>(
    y_true: Tensor<B, 4>,
    y_pred: Tensor<B, 4>,
) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
    let [b, x, y, z] = y_true.dims();
    let t = y_true.reshape([b, x * y * z]);
    let p = y_pred.reshape([b, x * y * z]);
    let tp = (t.clone() * p.clone()).sum_dim(1);
    (t.sum_dim(1), p.sum_dim(1), tp)
}

/// Soft Dice score per sample [B, 1].
pub fn dice_score<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 2> {
    let (t, p, tp) = overlap_sums(y_true, y_pred);
    tp.mul_scalar(2.0).add_scalar(EPSILON) / (t + p).add_scalar(EPSILON)
}

/// Soft Jaccard index per sample [B, 1].
pub fn jaccard_index<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 2> {
    let (t, p, tp) = overlap_sums(y_true, y_pred);
    tp.clone().add_scalar(EPSILON) / (t + p - tp).add_scalar(EPSILON)
}

/// `1 - dice`, averaged over the batch.
pub fn dice_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    dice_score(y_true, y_pred).mean().neg().add_scalar(1.0)
}

/// `1 - jaccard`, averaged over the batch.
pub fn jaccard_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    jaccard_index(y_true, y_pred).mean().neg().add_scalar(1.0)
}

/// Voxel-wise binary cross entropy. Predictions are clamped away from 0 and 1.
pub fn cross_entropy_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    let p = y_pred.clamp(EPSILON, 1.0 - EPSILON);
    let q = p.clone().neg().add_scalar(1.0);
    let t_neg = y_true.clone().neg().add_scalar(1.0);
    (y_true * p.log() + t_neg * q.log()).mean().neg()
}

/// Voxel-wise mean squared difference.
pub fn mean_squared_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    (y_true - y_pred).powf_scalar(2.0).mean()
}

/// Dispatch on the configured label similarity.
pub fn label_similarity_loss<B: Backend>(
    kind: LabelLossKind,
    y_true: Tensor<B, 4>,
    y_pred: Tensor<B, 4>,
) -> Tensor<B, 1> {
    match kind {
        LabelLossKind::Dice => dice_loss(y_true, y_pred),
        LabelLossKind::Jaccard => jaccard_loss(y_true, y_pred),
        LabelLossKind::CrossEntropy => cross_entropy_loss(y_true, y_pred),
        LabelLossKind::MeanSquared => mean_squared_loss(y_true, y_pred),
    }
}
