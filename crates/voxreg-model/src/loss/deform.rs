//! Smoothness penalties on displacement fields [B, 3, X, Y, Z].
//!
//! Derivatives are central differences in voxel units. Each derivative crops
//! one voxel from both ends of every spatial axis, so first-order energies need
//! at least 3 voxels per axis and the bending energy at least 5.

use burn::tensor::{backend::Backend, Tensor};
use std::ops::Range;

use crate::config::EnergyKind;

/// Central difference along spatial axis `axis` (0, 1 or 2), cropped to the
/// interior of every spatial axis.
fn central_diff<B: Backend>(f: Tensor<B, 5>, axis: usize) -> Tensor<B, 5> {
    let dims = f.dims();
    let ranges = |shift: usize| -> [Range<usize>; 5] {
        std::array::from_fn(|d| match d {
            0 | 1 => 0..dims[d],
            _ if d == axis + 2 => shift..dims[d] - 2 + shift,
            _ => 1..dims[d] - 1,
        })
    };
    let forward = f.clone().slice(ranges(2));
    let backward = f.slice(ranges(0));
    (forward - backward).div_scalar(2.0)
}

/// Mean squared first-order gradient.
pub fn gradient_l2_norm<B: Backend>(ddf: Tensor<B, 5>) -> Tensor<B, 1> {
    let dx = central_diff(ddf.clone(), 0);
    let dy = central_diff(ddf.clone(), 1);
    let dz = central_diff(ddf, 2);
    (dx.powf_scalar(2.0) + dy.powf_scalar(2.0) + dz.powf_scalar(2.0)).mean()
}

/// Mean absolute first-order gradient.
pub fn gradient_l1_norm<B: Backend>(ddf: Tensor<B, 5>) -> Tensor<B, 1> {
    let dx = central_diff(ddf.clone(), 0);
    let dy = central_diff(ddf.clone(), 1);
    let dz = central_diff(ddf, 2);
    (dx.abs() + dy.abs() + dz.abs()).mean()
}

/// Bending energy including the mixed second derivatives.
pub fn bending_energy<B: Backend>(ddf: Tensor<B, 5>) -> Tensor<B, 1> {
    let dx = central_diff(ddf.clone(), 0);
    let dy = central_diff(ddf.clone(), 1);
    let dz = central_diff(ddf, 2);

    let dxx = central_diff(dx.clone(), 0);
    let dyy = central_diff(dy.clone(), 1);
    let dzz = central_diff(dz, 2);
    let dxy = central_diff(dx.clone(), 1);
    let dxz = central_diff(dx, 2);
    let dyz = central_diff(dy, 2);

    let pure = dxx.powf_scalar(2.0) + dyy.powf_scalar(2.0) + dzz.powf_scalar(2.0);
    let mixed = dxy.powf_scalar(2.0) + dxz.powf_scalar(2.0) + dyz.powf_scalar(2.0);
    (pure + mixed.mul_scalar(2.0)).mean()
}

/// Dispatch on the configured energy.
pub fn local_displacement_energy<B: Backend>(ddf: Tensor<B, 5>, kind: EnergyKind) -> Tensor<B, 1> {
    match kind {
        EnergyKind::Bending => bending_energy(ddf),
        EnergyKind::GradientL1 => gradient_l1_norm(ddf),
        EnergyKind::GradientL2 => gradient_l2_norm(ddf),
    }
}
