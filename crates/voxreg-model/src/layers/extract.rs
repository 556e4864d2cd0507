use burn::{
    module::Ignored,
    nn::{
        conv::{Conv3d, Conv3dConfig},
        PaddingConfig3d,
    },
    prelude::*,
    tensor::activation,
};

use crate::config::{KernelInit, OutActivation};
use crate::spatial::resize;

impl OutActivation {
    /// Apply the activation element-wise.
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Linear => x,
            Self::Sigmoid => activation::sigmoid(x),
            Self::Tanh => activation::tanh(x),
            Self::Relu => activation::relu(x),
            Self::Softplus => activation::softplus(x, 1.0),
        }
    }
}

/// Resize to the output grid, then project to the output channel count.
#[derive(Module, Debug)]
pub struct ResizeProject<B: Backend> {
    conv: Conv3d<B>,
    output_shape: Ignored<[usize; 3]>,
    activation: Ignored<OutActivation>,
}

#[derive(Config, Debug)]
pub struct ResizeProjectConfig {
    in_channels: usize,
    out_channels: usize,
    output_shape: [usize; 3],
    #[config(default = "KernelInit::Zeros")]
    initializer: KernelInit,
    #[config(default = "OutActivation::Linear")]
    activation: OutActivation,
}

impl ResizeProjectConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResizeProject<B> {
        let init = self.initializer.initializer();
        ResizeProject {
            conv: Conv3dConfig::new([self.in_channels, self.out_channels], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .with_initializer(init)
                .init(device),
            output_shape: Ignored(self.output_shape),
            activation: Ignored(self.activation),
        }
    }
}

impl<B: Backend> ResizeProject<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = resize(x, *self.output_shape);
        self.activation.apply(self.conv.forward(x))
    }
}
