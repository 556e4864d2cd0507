//! Image similarity losses on single-channel volumes [B, X, Y, Z].
//!
//! Every loss is non-negative and zero for a perfect match.

use burn::tensor::{backend::Backend, module::conv3d, ops::ConvOptions, Tensor};

use crate::config::ImageLossKind;

const EPSILON: f32 = 1e-5;

/// Mean over a cubic window, zero padded to keep the shape.
fn box_mean<B: Backend>(x: Tensor<B, 5>, kernel_size: usize) -> Tensor<B, 5> {
    let n = kernel_size.pow(3) as f32;
    let weight = Tensor::ones([1, 1, kernel_size, kernel_size, kernel_size], &x.device()).div_scalar(n);
    let padding = kernel_size / 2;
    let options = ConvOptions::new([1, 1, 1], [padding; 3], [1, 1, 1], 1);
    conv3d(x, weight, None, options)
}

/// Local normalized cross correlation loss.
///
/// `1 - mean(cc)` where `cc = cov² / (var_true * var_pred)` is computed over a
/// `kernel_size³` window around each voxel.
pub fn local_ncc_loss<B: Backend>(
    y_true: Tensor<B, 4>,
    y_pred: Tensor<B, 4>,
    kernel_size: usize,
) -> Tensor<B, 1> {
    let i = y_true.unsqueeze_dim::<5>(1);
    let j = y_pred.unsqueeze_dim::<5>(1);

    let i_mean = box_mean(i.clone(), kernel_size);
    let j_mean = box_mean(j.clone(), kernel_size);
    let i2_mean = box_mean(i.clone() * i.clone(), kernel_size);
    let j2_mean = box_mean(j.clone() * j.clone(), kernel_size);
    let ij_mean = box_mean(i * j, kernel_size);

    let cross = ij_mean - i_mean.clone() * j_mean.clone();
    let i_var = i2_mean - i_mean.powf_scalar(2.0);
    let j_var = j2_mean - j_mean.powf_scalar(2.0);

    let cc = cross.clone() * cross / (i_var * j_var + EPSILON);
    cc.clamp(0.0, 1.0).mean().neg().add_scalar(1.0)
}

/// Global normalized cross correlation loss, per sample then averaged.
pub fn global_ncc_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    let [b, x, y, z] = y_true.dims();
    let i = y_true.reshape([b, x * y * z]);
    let j = y_pred.reshape([b, x * y * z]);

    let i_hat = i.clone() - i.mean_dim(1);
    let j_hat = j.clone() - j.mean_dim(1);

    let num = (i_hat.clone() * j_hat.clone()).mean_dim(1);
    let den = (i_hat.powf_scalar(2.0).mean_dim(1) * j_hat.powf_scalar(2.0).mean_dim(1))
        .add_scalar(EPSILON)
        .sqrt();

    (num / den).clamp(0.0, 1.0).mean().neg().add_scalar(1.0)
}

/// Mean squared intensity difference.
pub fn ssd_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
    (y_true - y_pred).powf_scalar(2.0).mean()
}

/// Dispatch on the configured image similarity.
pub fn image_similarity_loss<B: Backend>(
    kind: ImageLossKind,
    y_true: Tensor<B, 4>,
    y_pred: Tensor<B, 4>,
    kernel_size: usize,
) -> Tensor<B, 1> {
    match kind {
        ImageLossKind::Lncc => local_ncc_loss(y_true, y_pred, kernel_size),
        ImageLossKind::Gncc => global_ncc_loss(y_true, y_pred),
        ImageLossKind::Ssd => ssd_loss(y_true, y_pred),
    }
}
