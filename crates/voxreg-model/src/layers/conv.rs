use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig3d, Relu,
    },
    prelude::*,
};

/// Convolution → batch normalization → ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv3d<B>,
    norm: BatchNorm<B, 3>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = 3)]
    kernel_size: usize,
}

/// Same-padded 3D convolution without bias (a norm layer always follows).
pub(crate) fn same_conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    device: &B::Device,
) -> Conv3d<B> {
    let pad = kernel_size / 2;
    Conv3dConfig::new([in_channels, out_channels], [kernel_size; 3])
        .with_padding(PaddingConfig3d::Explicit(pad, pad, pad))
        .with_bias(false)
        .init(device)
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            conv: same_conv(self.in_channels, self.out_channels, self.kernel_size, device),
            norm: BatchNormConfig::new(self.out_channels).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// Two convolutions with an identity shortcut.
///
/// `relu(norm(conv(conv_block(x))) + x)`; input and output channels match.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    block: ConvBlock<B>,
    conv: Conv3d<B>,
    norm: BatchNorm<B, 3>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    channels: usize,
    #[config(default = 3)]
    kernel_size: usize,
}

impl ResidualBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        ResidualBlock {
            block: ConvBlockConfig::new(self.channels, self.channels)
                .with_kernel_size(self.kernel_size)
                .init(device),
            conv: same_conv(self.channels, self.channels, self.kernel_size, device),
            norm: BatchNormConfig::new(self.channels).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let h = self.block.forward(x.clone());
        let h = self.norm.forward(self.conv.forward(h));
        self.activation.forward(h + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_conv_block_shape() {
        let device = Default::default();
        let block = ConvBlockConfig::new(2, 4)
            .with_kernel_size(7)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 5>::random([1, 2, 6, 5, 4], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [1, 4, 6, 5, 4]);
    }

    #[test]
    fn test_residual_block_is_non_negative() {
        let device = Default::default();
        let block = ResidualBlockConfig::new(3).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 5>::random([2, 3, 4, 4, 4], Distribution::Normal(0.0, 1.0), &device);
        let y = block.forward(x);
        assert_eq!(y.dims(), [2, 3, 4, 4, 4]);
        let min: f32 = y.min().into_scalar();
        assert!(min >= 0.0);
    }
}
