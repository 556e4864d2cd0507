//! Multi-level extraction network.
//!
//! ```text
//! level 0  down ──────────────────────────────── up ── extract? ─┐
//! level 1    down ────────────────────────── up ──── extract? ───┤ mean
//!  ...                                                          │
//! level E      bottleneck ───────────────────────── extract? ───┘
//! ```
//!
//! Decoding stops at the coarsest extraction level D, so levels finer than D
//! are never decoded.

use burn::{module::Ignored, prelude::*};

use crate::config::{KernelInit, LocalNetConfig, OutActivation};
use crate::error::Result;
use crate::layers::{
    ConvBlock, ConvBlockConfig, DownSampleBlock, DownSampleBlockConfig, ResizeProject,
    ResizeProjectConfig, SkipFusion, UpSampleBlock, UpSampleBlockConfig,
};

/// Kernel edge of the first encoder convolution.
const FIRST_KERNEL_SIZE: usize = 7;

#[derive(Module, Debug)]
pub struct LocalNet<B: Backend> {
    /// Encoder blocks for levels 0..E.
    down: Vec<DownSampleBlock<B>>,
    bottleneck: ConvBlock<B>,
    /// Decoder blocks for levels E-1 down to D.
    up: Vec<UpSampleBlock<B>>,
    /// One head per extraction level, in configured order.
    extract: Vec<ResizeProject<B>>,
    extract_levels: Ignored<Vec<usize>>,
    min_level: Ignored<usize>,
    out_channels: Ignored<usize>,
    output_shape: Ignored<[usize; 3]>,
}

/// Channel count at a pyramid level.
pub(crate) fn level_channels(num_channel_initial: usize, level: usize) -> usize {
    num_channel_initial << level
}

impl<B: Backend> LocalNet<B> {
    /// Build the network; extraction levels are validated first.
    pub fn new(
        config: &LocalNetConfig,
        in_channels: usize,
        out_channels: usize,
        output_shape: [usize; 3],
        initializer: KernelInit,
        activation: OutActivation,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;

        let nc = config.num_channel_initial;
        let max_level = config.max_level();
        let min_level = config.min_level();

        let down = (0..max_level)
            .map(|level| {
                let in_ch = if level == 0 { in_channels } else { level_channels(nc, level - 1) };
                let kernel = if level == 0 { FIRST_KERNEL_SIZE } else { 3 };
                DownSampleBlockConfig::new(in_ch, level_channels(nc, level))
                    .with_kernel_size(kernel)
                    .init(device)
            })
            .collect();

        let bottleneck_in = if max_level == 0 {
            in_channels
        } else {
            level_channels(nc, max_level - 1)
        };
        let bottleneck = ConvBlockConfig::new(bottleneck_in, level_channels(nc, max_level))
            .with_kernel_size(if max_level == 0 { FIRST_KERNEL_SIZE } else { 3 })
            .init(device);

        let up = (min_level..max_level)
            .rev()
            .map(|level| {
                UpSampleBlockConfig::new(level_channels(nc, level + 1), level_channels(nc, level))
                    .init(SkipFusion::Add, device)
            })
            .collect();

        let extract = config
            .extract_levels
            .iter()
            .map(|&level| {
                ResizeProjectConfig::new(level_channels(nc, level), out_channels, output_shape)
                    .with_initializer(initializer)
                    .with_activation(activation)
                    .init(device)
            })
            .collect();

        Ok(Self {
            down,
            bottleneck,
            up,
            extract,
            extract_levels: Ignored(config.extract_levels.clone()),
            min_level: Ignored(min_level),
            out_channels: Ignored(out_channels),
            output_shape: Ignored(output_shape),
        })
    }

    /// Encode then decode `x` [B, C, X, Y, Z].
    ///
    /// Returns the decoded pyramid, element `i` holding level `D + i`; the last
    /// element is the bottleneck at level E.
    pub fn decode(&self, x: Tensor<B, 5>) -> Vec<Tensor<B, 5>> {
        let mut skips = Vec::with_capacity(self.down.len());
        let mut h = x;
        for block in &self.down {
            let (pooled, skip) = block.forward(h);
            skips.push(skip);
            h = pooled;
        }
        h = self.bottleneck.forward(h);

        // Built coarse to fine, then reversed. Skips finer than D are unused.
        let mut decoded = vec![h.clone()];
        for (block, skip) in self.up.iter().zip(skips.into_iter().rev()) {
            h = block.forward(h, skip);
            decoded.push(h.clone());
        }
        decoded.reverse();
        decoded
    }

    /// Project each extraction level to the output grid and average.
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let [batch, ..] = x.dims();
        let device = x.device();
        let decoded = self.decode(x);
        let min_level = *self.min_level;

        let count = self.extract.len();
        let [ox, oy, oz] = *self.output_shape;
        let zeros = Tensor::zeros([batch, *self.out_channels, ox, oy, oz], &device);

        let sum = self
            .extract_levels
            .iter()
            .zip(&self.extract)
            .map(|(&level, head)| head.forward(decoded[level - min_level].clone()))
            .fold(zeros, |acc, t| acc + t);

        // A single level is returned untouched.
        if count == 1 {
            sum
        } else {
            sum.div_scalar(count as f32)
        }
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

    fn build(levels: Vec<usize>, init: KernelInit) -> LocalNet<TestBackend> {
        let config = LocalNetConfig::new()
            .with_num_channel_initial(2)
            .with_extract_levels(levels);
        LocalNet::new(
            &config,
            2,
            3,
            [8, 8, 8],
            init,
            OutActivation::Linear,
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_decoded_pyramid_levels() {
        let device = Default::default();
        let net = build(vec![1, 3], KernelInit::Zeros);
        let x = Tensor::<TestBackend, 5>::random([1, 2, 8, 8, 8], Distribution::Default, &device);

        let decoded = net.decode(x);
        let shapes: Vec<_> = decoded.iter().map(|t| t.dims()).collect();
        assert_eq!(
            shapes,
            vec![[1, 4, 4, 4, 4], [1, 8, 2, 2, 2], [1, 16, 1, 1, 1]]
        );
    }

    #[test]
    fn test_single_level_is_raw_projection() {
        let device = Default::default();
        let net = build(vec![1], KernelInit::GlorotUniform);
        let x = Tensor::<TestBackend, 5>::random([2, 2, 8, 8, 8], Distribution::Default, &device);

        let decoded = net.decode(x.clone());
        let raw = net.extract[0].forward(decoded[0].clone());
        let fused = net.forward(x);

        let diff: f32 = (fused - raw).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_multi_level_is_mean_of_projections() {
        let device = Default::default();
        let net = build(vec![0, 2], KernelInit::GlorotNormal);
        let x = Tensor::<TestBackend, 5>::random([1, 2, 8, 8, 8], Distribution::Default, &device);

        let decoded = net.decode(x.clone());
        let p0 = net.extract[0].forward(decoded[0].clone());
        let p2 = net.extract[1].forward(decoded[2].clone());
        let expected = (p0 + p2).div_scalar(2.0);

        let diff: f32 = (net.forward(x) - expected).abs().max().into_scalar();
        assert!(diff < 1e-5);
    }

    #[test]
    fn test_odd_shape_hits_output_grid() {
        let device = Default::default();
        let config = LocalNetConfig::new()
            .with_num_channel_initial(2)
            .with_extract_levels(vec![0, 1, 2]);
        let net = LocalNet::<TestBackend>::new(
            &config,
            1,
            1,
            [7, 5, 9],
            KernelInit::HeNormal,
            OutActivation::Sigmoid,
            &device,
        )
        .unwrap();
        let x = Tensor::<TestBackend, 5>::random([1, 1, 7, 5, 9], Distribution::Default, &device);
        assert_eq!(net.forward(x).dims(), [1, 1, 7, 5, 9]);
    }
}
