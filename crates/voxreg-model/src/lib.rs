//! Deep-learning deformable registration of 3D volumes on burn.
//!
//! Tensors are channel-first: volumes are `[batch, channels, x, y, z]`,
//! single-channel images and labels `[batch, x, y, z]`, displacement and
//! velocity fields `[batch, 3, x, y, z]` with channel k displacing along
//! spatial axis k in voxels.

pub mod backbone;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod layers;
pub mod loss;
pub mod metric;
pub mod network;
pub mod spatial;

pub use backbone::{Backbone, LocalNet, UNet, VolumeTransform};
pub use config::{
    BackboneConfig, BackboneKind, EnergyKind, ImageLossKind, KernelInit, LabelLossKind, LocalNetConfig,
    LossConfig, Method, ModelConfig, OutActivation, UNetConfig,
};
pub use error::{ModelError, Result};
pub use metric::MetricBundle;
pub use network::{LossBundle, ModelInputs, ModelOutput, RegistrationModel};
pub use spatial::{integrate_velocity, resize, warp, IntDvf, Warping};
