use burn::{module::Ignored, prelude::*};

use super::conv::{ConvBlock, ConvBlockConfig, ResidualBlock, ResidualBlockConfig};
use crate::spatial::resize;

/// How a decoded tensor is merged with its encoder skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipFusion {
    #[default]
    Add,
    Concat,
}

/// Decoder level.
///
/// The coarse tensor is resized to the skip's exact spatial shape (any ratio),
/// projected to the skip's channel count, fused with the skip and refined by a
/// conv block and a residual block.
#[derive(Module, Debug)]
pub struct UpSampleBlock<B: Backend> {
    project: ConvBlock<B>,
    fuse: ConvBlock<B>,
    residual: ResidualBlock<B>,
    fusion: Ignored<SkipFusion>,
}

#[derive(Config, Debug)]
pub struct UpSampleBlockConfig {
    in_channels: usize,
    out_channels: usize,
}

impl UpSampleBlockConfig {
    pub fn init<B: Backend>(&self, fusion: SkipFusion, device: &B::Device) -> UpSampleBlock<B> {
        let fused_channels = match fusion {
            SkipFusion::Add => self.out_channels,
            SkipFusion::Concat => 2 * self.out_channels,
        };
        UpSampleBlock {
            project: ConvBlockConfig::new(self.in_channels, self.out_channels).init(device),
            fuse: ConvBlockConfig::new(fused_channels, self.out_channels).init(device),
            residual: ResidualBlockConfig::new(self.out_channels).init(device),
            fusion: Ignored(fusion),
        }
    }
}

impl<B: Backend> UpSampleBlock<B> {
    /// # Arguments
    /// * `coarse` - Decoded tensor of the coarser level [B, in, x, y, z]
    /// * `skip` - Encoder skip of this level [B, out, X, Y, Z]
    pub fn forward(&self, coarse: Tensor<B, 5>, skip: Tensor<B, 5>) -> Tensor<B, 5> {
        let [_, _, x, y, z] = skip.dims();
        let up = self.project.forward(resize(coarse, [x, y, z]));

        let fused = match *self.fusion {
            SkipFusion::Add => up + skip,
            SkipFusion::Concat => Tensor::cat(vec![up, skip], 1),
        };

        self.residual.forward(self.fuse.forward(fused))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_up_sample_non_dyadic() {
        let device = Default::default();
        for fusion in [SkipFusion::Add, SkipFusion::Concat] {
            let block = UpSampleBlockConfig::new(8, 4).init::<TestBackend>(fusion, &device);
            let coarse = Tensor::<TestBackend, 5>::random([1, 8, 3, 2, 2], Distribution::Default, &device);
            let skip = Tensor::<TestBackend, 5>::random([1, 4, 5, 3, 4], Distribution::Default, &device);

            let out = block.forward(coarse, skip);
            assert_eq!(out.dims(), [1, 4, 5, 3, 4]);
        }
    }
}
