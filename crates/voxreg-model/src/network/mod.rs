//! End-to-end task graphs.
//!
//! | method        | backbone input                              | output           |
//! |---------------|---------------------------------------------|------------------|
//! | `ddf`         | moving image (resized), fixed image         | DDF, warped      |
//! | `dvf`         | moving image (resized), fixed image         | DVF → DDF, warped|
//! | `conditional` | moving image, fixed image, moving label     | fixed label      |
//! | `seg`         | fixed image                                 | fixed label      |
//!
//! Losses are returned as a [`LossBundle`] rather than attached to the model.

pub mod loss;

pub use loss::LossBundle;

use burn::{module::Ignored, prelude::*};

use crate::backbone::{Backbone, VolumeTransform};
use crate::config::{Method, ModelConfig};
use crate::error::{ModelError, Result};
use crate::loss::{image_similarity_loss, label_similarity_loss, local_displacement_energy};
use crate::metric::MetricBundle;
use crate::spatial::{resize_volume, IntDvf, Warping};

/// Named model inputs.
#[derive(Debug, Clone)]
pub struct ModelInputs<B: Backend> {
    /// [B, m1, m2, m3]
    pub moving_image: Tensor<B, 4>,
    /// [B, f1, f2, f3]
    pub fixed_image: Tensor<B, 4>,
    /// [B, m1, m2, m3]
    pub moving_label: Tensor<B, 4>,
    /// Sample identifiers [B, index_size], passed through untouched.
    pub indices: Tensor<B, 2>,
}

impl<B: Backend> ModelInputs<B> {
    pub fn new(
        moving_image: Tensor<B, 4>,
        fixed_image: Tensor<B, 4>,
        moving_label: Tensor<B, 4>,
        indices: Tensor<B, 2>,
    ) -> Self {
        Self {
            moving_image,
            fixed_image,
            moving_label,
            indices,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.fixed_image.dims()[0]
    }
}

/// Model outputs.
#[derive(Debug, Clone)]
pub struct ModelOutput<B: Backend> {
    /// Primary output [B, f1, f2, f3].
    pub pred_fixed_label: Tensor<B, 4>,
    /// Warped moving image, field methods only.
    pub pred_fixed_image: Option<Tensor<B, 4>>,
    /// Displacement field [B, 3, f1, f2, f3], field methods only.
    pub ddf: Option<Tensor<B, 5>>,
    /// Velocity field before integration, `dvf` only.
    pub dvf: Option<Tensor<B, 5>>,
    pub indices: Tensor<B, 2>,
}

/// Backbone wired into one of the four task graphs.
#[derive(Module, Debug)]
pub struct RegistrationModel<B: Backend> {
    backbone: Backbone<B>,
    warping: Warping<B>,
    integration: IntDvf<B>,
    config: Ignored<ModelConfig>,
}

impl<B: Backend> RegistrationModel<B> {
    /// Validate `config` and build every layer.
    ///
    /// All configuration errors surface here, before any parameter exists.
    pub fn new(config: &ModelConfig, device: &B::Device) -> Result<Self> {
        if let Err(err) = config.validate() {
            tracing::error!(error = %err, "Rejected model configuration");
            return Err(err);
        }

        let backbone = Backbone::new(config, device)?;
        let model = Self {
            backbone,
            warping: Warping::new(config.fixed_image_size),
            integration: IntDvf::new(config.integration_steps),
            config: Ignored(config.clone()),
        };

        tracing::info!(
            method = %config.method,
            moving_image_size = ?config.moving_image_size,
            fixed_image_size = ?config.fixed_image_size,
            num_params = model.num_params(),
            "Built registration model"
        );
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn method(&self) -> Method {
        self.config.method
    }

    pub fn backbone(&self) -> &Backbone<B> {
        &self.backbone
    }

    fn check_inputs(&self, inputs: &ModelInputs<B>) -> Result<()> {
        let batch = inputs.batch_size();
        let [mx, my, mz] = self.config.moving_image_size;
        let [fx, fy, fz] = self.config.fixed_image_size;

        let volumes = [
            ("moving_image", &inputs.moving_image, [batch, mx, my, mz]),
            ("fixed_image", &inputs.fixed_image, [batch, fx, fy, fz]),
            ("moving_label", &inputs.moving_label, [batch, mx, my, mz]),
        ];
        for (name, tensor, expected) in volumes {
            let actual = tensor.dims();
            if actual != expected {
                return Err(ModelError::shape_mismatch(name, &expected, &actual));
            }
        }

        let expected = [batch, self.config.index_size];
        let actual = inputs.indices.dims();
        if actual != expected {
            return Err(ModelError::shape_mismatch("indices", &expected, &actual));
        }
        Ok(())
    }

    /// Moving volume resampled onto the fixed grid, with a channel axis.
    fn to_fixed_grid(&self, volume: Tensor<B, 4>) -> Tensor<B, 5> {
        resize_volume(volume, self.config.fixed_image_size).unsqueeze_dim::<5>(1)
    }

    pub fn forward(&self, inputs: ModelInputs<B>) -> Result<ModelOutput<B>> {
        self.check_inputs(&inputs)?;
        let ModelInputs {
            moving_image,
            fixed_image,
            moving_label,
            indices,
        } = inputs;
        let fixed = fixed_image.unsqueeze_dim::<5>(1);

        let output = match self.method() {
            Method::Ddf | Method::Dvf => {
                let input = Tensor::cat(vec![self.to_fixed_grid(moving_image.clone()), fixed], 1);
                let field = self.backbone.forward(input);

                let (ddf, dvf) = if self.method() == Method::Dvf {
                    (self.integration.forward(field.clone()), Some(field))
                } else {
                    (field, None)
                };

                let pred_fixed_image = self.warping.forward(ddf.clone(), moving_image)?;
                let pred_fixed_label = self.warping.forward(ddf.clone(), moving_label)?;
                ModelOutput {
                    pred_fixed_label,
                    pred_fixed_image: Some(pred_fixed_image),
                    ddf: Some(ddf),
                    dvf,
                    indices,
                }
            }
            Method::Conditional => {
                let input = Tensor::cat(
                    vec![
                        self.to_fixed_grid(moving_image),
                        fixed,
                        self.to_fixed_grid(moving_label),
                    ],
                    1,
                );
                ModelOutput {
                    pred_fixed_label: self.backbone.forward(input).squeeze::<4>(1),
                    pred_fixed_image: None,
                    ddf: None,
                    dvf: None,
                    indices,
                }
            }
            Method::Seg => ModelOutput {
                pred_fixed_label: self.backbone.forward(fixed).squeeze::<4>(1),
                pred_fixed_image: None,
                ddf: None,
                dvf: None,
                indices,
            },
        };
        Ok(output)
    }

    /// Loss terms for one forward pass.
    ///
    /// Field methods add the image term when its weight is positive and the
    /// regularization term always. The label term is added whenever
    /// `fixed_label` is given.
    pub fn losses(
        &self,
        inputs: &ModelInputs<B>,
        output: &ModelOutput<B>,
        fixed_label: Option<Tensor<B, 4>>,
    ) -> Result<LossBundle<B>> {
        let loss_config = &self.config.loss;
        let mut bundle = LossBundle::new(&inputs.fixed_image.device());

        if let (Some(pred_fixed_image), Some(ddf)) = (&output.pred_fixed_image, &output.ddf) {
            let image = &loss_config.similarity.image;
            if image.weight > 0.0 {
                let value = image_similarity_loss(
                    image.name,
                    inputs.fixed_image.clone(),
                    pred_fixed_image.clone(),
                    image.kernel_size,
                );
                bundle.push(
                    LossBundle::<B>::IMAGE_SIMILARITY,
                    LossBundle::<B>::WEIGHTED_IMAGE_SIMILARITY,
                    value,
                    image.weight,
                );
            }

            let regularization = &loss_config.regularization;
            let value = local_displacement_energy(ddf.clone(), regularization.energy_type);
            bundle.push(
                LossBundle::<B>::REGULARIZATION,
                LossBundle::<B>::WEIGHTED_REGULARIZATION,
                value,
                regularization.weight,
            );
        }

        if let Some(fixed_label) = fixed_label {
            let expected = output.pred_fixed_label.dims();
            let actual = fixed_label.dims();
            if actual != expected {
                return Err(ModelError::shape_mismatch("fixed_label", &expected, &actual));
            }
            let label = &loss_config.similarity.label;
            let value = label_similarity_loss(label.name, fixed_label, output.pred_fixed_label.clone());
            bundle.push(
                LossBundle::<B>::LABEL,
                LossBundle::<B>::WEIGHTED_LABEL,
                value,
                label.weight,
            );
        }

        Ok(bundle)
    }

    /// Overlap and distance metrics on the fixed grid.
    pub fn metrics(&self, output: &ModelOutput<B>, fixed_label: Tensor<B, 4>) -> Result<MetricBundle<B>> {
        let expected = output.pred_fixed_label.dims();
        let actual = fixed_label.dims();
        if actual != expected {
            return Err(ModelError::shape_mismatch("fixed_label", &expected, &actual));
        }
        Ok(MetricBundle::compute(
            fixed_label,
            output.pred_fixed_label.clone(),
            self.config.fixed_image_size,
        ))
    }
}
