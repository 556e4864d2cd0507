use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        PaddingConfig3d,
    },
    prelude::*,
};

use super::conv::{ConvBlock, ConvBlockConfig, ResidualBlock, ResidualBlockConfig};

/// Encoder level: conv block, residual block, then a stride-2 convolution.
///
/// Each spatial axis of the pooled output has `ceil(n / 2)` voxels, so odd
/// extents are allowed.
#[derive(Module, Debug)]
pub struct DownSampleBlock<B: Backend> {
    conv: ConvBlock<B>,
    residual: ResidualBlock<B>,
    pool: Conv3d<B>,
}

#[derive(Config, Debug)]
pub struct DownSampleBlockConfig {
    in_channels: usize,
    filters: usize,
    #[config(default = 3)]
    kernel_size: usize,
}

impl DownSampleBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DownSampleBlock<B> {
        DownSampleBlock {
            conv: ConvBlockConfig::new(self.in_channels, self.filters)
                .with_kernel_size(self.kernel_size)
                .init(device),
            residual: ResidualBlockConfig::new(self.filters).init(device),
            pool: Conv3dConfig::new([self.filters, self.filters], [3, 3, 3])
                .with_stride([2, 2, 2])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
        }
    }
}

impl<B: Backend> DownSampleBlock<B> {
    /// Returns `(pooled, skip)`, the skip keeping the input resolution.
    pub fn forward(&self, x: Tensor<B, 5>) -> (Tensor<B, 5>, Tensor<B, 5>) {
        let skip = self.residual.forward(self.conv.forward(x));
        let pooled = self.pool.forward(skip.clone());
        (pooled, skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_down_sample_halves_rounding_up() {
        let device = Default::default();
        let block = DownSampleBlockConfig::new(2, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 5>::random([1, 2, 8, 5, 3], Distribution::Default, &device);

        let (pooled, skip) = block.forward(x);
        assert_eq!(skip.dims(), [1, 4, 8, 5, 3]);
        assert_eq!(pooled.dims(), [1, 4, 4, 3, 2]);
    }
}
