//! Backbone networks mapping a stacked input volume to the output grid.
//!
//! # Module Structure
//!
//! ```text
//! backbone/
//! ├── local_net.rs  - Multi-level extraction network (averaged level heads)
//! └── u_net.rs      - Encoder-decoder with a single full-resolution head
//! ```

pub mod local_net;
pub mod u_net;

pub use local_net::LocalNet;
pub use u_net::UNet;

use burn::prelude::*;

use crate::config::{BackboneKind, ModelConfig};
use crate::error::Result;

/// A volumetric feature transform that owns its parameters.
///
/// Input [B, C_in, X, Y, Z] on the fixed grid, output [B, C_out, X, Y, Z].
pub trait VolumeTransform<B: Backend> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5>;

    fn out_channels(&self) -> usize;
}

impl<B: Backend> VolumeTransform<B> for LocalNet<B> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        LocalNet::forward(self, x)
    }

    fn out_channels(&self) -> usize {
        LocalNet::out_channels(self)
    }
}

impl<B: Backend> VolumeTransform<B> for UNet<B> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        UNet::forward(self, x)
    }

    fn out_channels(&self) -> usize {
        UNet::out_channels(self)
    }
}

/// Backbone selected by `backbone.name`.
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    Local(LocalNet<B>),
    UNet(UNet<B>),
}

impl<B: Backend> Backbone<B> {
    /// Build the backbone for the configured method and fixed grid.
    pub fn new(config: &ModelConfig, device: &B::Device) -> Result<Self> {
        let method = config.method;
        let in_channels = method.in_channels();
        let out_channels = method.out_channels();
        let head = &config.backbone;

        let backbone = match head.name {
            BackboneKind::Local => Self::Local(LocalNet::new(
                &config.local,
                in_channels,
                out_channels,
                config.fixed_image_size,
                head.out_kernel_initializer,
                head.out_activation,
                device,
            )?),
            BackboneKind::UNet => Self::UNet(UNet::new(
                &config.unet,
                in_channels,
                out_channels,
                config.fixed_image_size,
                head.out_kernel_initializer,
                head.out_activation,
                device,
            )?),
        };

        match head.name {
            BackboneKind::Local => tracing::info!(
                backbone = %head.name,
                %method,
                in_channels,
                out_channels,
                extract_levels = ?config.local.extract_levels,
                depth = config.local.max_level(),
                "Built backbone"
            ),
            BackboneKind::UNet => tracing::info!(
                backbone = %head.name,
                %method,
                in_channels,
                out_channels,
                depth = config.unet.depth,
                concat_skip = config.unet.concat_skip,
                "Built backbone"
            ),
        }

        Ok(backbone)
    }
}

impl<B: Backend> VolumeTransform<B> for Backbone<B> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        match self {
            Self::Local(net) => net.forward(x),
            Self::UNet(net) => net.forward(x),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Local(net) => net.out_channels(),
            Self::UNet(net) => net.out_channels(),
        }
    }
}
