//! Standard encoder-decoder network.
//!
//! The full decoder runs back to level 0 and only the finest tensor is
//! projected to the output grid.

use burn::{module::Ignored, prelude::*};

use super::local_net::level_channels;
use crate::config::{KernelInit, OutActivation, UNetConfig};
use crate::error::Result;
use crate::layers::{
    ConvBlock, ConvBlockConfig, DownSampleBlock, DownSampleBlockConfig, ResizeProject,
    ResizeProjectConfig, SkipFusion, UpSampleBlock, UpSampleBlockConfig,
};

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    down: Vec<DownSampleBlock<B>>,
    bottleneck: ConvBlock<B>,
    up: Vec<UpSampleBlock<B>>,
    head: ResizeProject<B>,
    out_channels: Ignored<usize>,
}

impl<B: Backend> UNet<B> {
    pub fn new(
        config: &UNetConfig,
        in_channels: usize,
        out_channels: usize,
        output_shape: [usize; 3],
        initializer: KernelInit,
        activation: OutActivation,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;

        let nc = config.num_channel_initial;
        let depth = config.depth;
        let fusion = if config.concat_skip {
            SkipFusion::Concat
        } else {
            SkipFusion::Add
        };

        let down = (0..depth)
            .map(|level| {
                let in_ch = if level == 0 { in_channels } else { level_channels(nc, level - 1) };
                DownSampleBlockConfig::new(in_ch, level_channels(nc, level)).init(device)
            })
            .collect();
        let bottleneck =
            ConvBlockConfig::new(level_channels(nc, depth - 1), level_channels(nc, depth)).init(device);
        let up = (0..depth)
            .rev()
            .map(|level| {
                UpSampleBlockConfig::new(level_channels(nc, level + 1), level_channels(nc, level))
                    .init(fusion, device)
            })
            .collect();
        let head = ResizeProjectConfig::new(nc, out_channels, output_shape)
            .with_initializer(initializer)
            .with_activation(activation)
            .init(device);

        Ok(Self {
            down,
            bottleneck,
            up,
            head,
            out_channels: Ignored(out_channels),
        })
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut skips = Vec::with_capacity(self.down.len());
        let mut h = x;
        for block in &self.down {
            let (pooled, skip) = block.forward(h);
            skips.push(skip);
            h = pooled;
        }

        h = self.bottleneck.forward(h);
        for (block, skip) in self.up.iter().zip(skips.into_iter().rev()) {
            h = block.forward(h, skip);
        }

        self.head.forward(h)
    }

    pub fn out_channels(&self) -> usize {
        *self.out_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_unet_output_shape() {
        let device = Default::default();
        for concat_skip in [false, true] {
            let config = UNetConfig::new()
                .with_num_channel_initial(2)
                .with_depth(2)
                .with_concat_skip(concat_skip);
            let net = UNet::<TestBackend>::new(
                &config,
                2,
                3,
                [6, 10, 5],
                KernelInit::GlorotUniform,
                OutActivation::Linear,
                &device,
            )
            .unwrap();

            let x = Tensor::<TestBackend, 5>::random([2, 2, 6, 10, 5], Distribution::Default, &device);
            assert_eq!(net.forward(x).dims(), [2, 3, 6, 10, 5]);
        }
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = UNetConfig::new().with_depth(0);
        let result = UNet::<TestBackend>::new(
            &config,
            1,
            1,
            [4, 4, 4],
            KernelInit::Zeros,
            OutActivation::Linear,
            &Default::default(),
        );
        assert!(result.is_err());
    }
}
