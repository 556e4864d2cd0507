//! Model configuration schema.
//!
//! The records mirror the external configuration layout:
//!
//! ```text
//! method                       ddf | dvf | conditional | seg
//! backbone.name                local | unet
//! backbone.out_activation      "" | linear | sigmoid | tanh | relu | softplus
//! backbone.out_kernel_initializer
//! local.num_channel_initial, local.extract_levels, local.depth
//! unet.num_channel_initial, unet.depth, unet.concat_skip
//! loss.similarity.image.{name, weight, kernel_size}
//! loss.similarity.label.{name, weight}
//! loss.regularization.{weight, energy_type}
//! ```
//!
//! String choices are parsed through `FromStr`, so an unknown value in a JSON
//! document fails to load with an error naming it. A config is immutable once
//! it reaches [`crate::network::RegistrationModel::new`], which calls
//! [`ModelConfig::validate`] before creating any parameters.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::config::Config;
use burn::nn::Initializer;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Implements `FromStr`, `Display` and the serde string round-trip for a
/// closed set of named choices.
macro_rules! string_choice {
    ($ty:ident, $err:ident, { $($variant:ident => [$canonical:literal $(, $alias:literal)*]),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim() {
                    $($canonical $(| $alias)* => Ok(Self::$variant),)+
                    other => Err(ModelError::$err(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($canonical),)+
                }
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ModelError;

            fn try_from(value: String) -> Result<Self> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.to_string()
            }
        }
    };
}

/// End-to-end task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Method {
    /// Backbone regresses a dense displacement field.
    Ddf,
    /// Backbone regresses a velocity field, integrated into a DDF.
    Dvf,
    /// Backbone regresses the fixed label from image, image and label.
    Conditional,
    /// Backbone segments the fixed image.
    Seg,
}

string_choice!(Method, UnknownMethod, {
    Ddf => ["ddf"],
    Dvf => ["dvf"],
    Conditional => ["conditional"],
    Seg => ["seg"],
});

impl Method {
    /// Whether the task produces a deformation field.
    pub fn has_field(self) -> bool {
        matches!(self, Self::Ddf | Self::Dvf)
    }

    /// Channels the backbone must output for this task.
    pub fn out_channels(self) -> usize {
        if self.has_field() {
            3
        } else {
            1
        }
    }

    /// Channels the backbone receives for this task.
    pub fn in_channels(self) -> usize {
        match self {
            Self::Ddf | Self::Dvf => 2,
            Self::Conditional => 3,
            Self::Seg => 1,
        }
    }
}

/// Backbone architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackboneKind {
    Local,
    UNet,
}

string_choice!(BackboneKind, UnknownBackbone, {
    Local => ["local"],
    UNet => ["unet"],
});

/// Activation applied to the backbone output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutActivation {
    Linear,
    Sigmoid,
    Tanh,
    Relu,
    Softplus,
}

string_choice!(OutActivation, UnknownActivation, {
    Linear => ["linear", "", "none"],
    Sigmoid => ["sigmoid"],
    Tanh => ["tanh"],
    Relu => ["relu"],
    Softplus => ["softplus"],
});

/// Kernel initializer for the output projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KernelInit {
    Zeros,
    GlorotUniform,
    GlorotNormal,
    HeUniform,
    HeNormal,
}

string_choice!(KernelInit, UnknownInitializer, {
    Zeros => ["zeros"],
    GlorotUniform => ["glorot_uniform"],
    GlorotNormal => ["glorot_normal"],
    HeUniform => ["he_uniform"],
    HeNormal => ["he_normal"],
});

impl KernelInit {
    /// Equivalent burn initializer.
    pub fn initializer(self) -> Initializer {
        let he_gain = std::f64::consts::SQRT_2;
        match self {
            Self::Zeros => Initializer::Zeros,
            Self::GlorotUniform => Initializer::XavierUniform { gain: 1.0 },
            Self::GlorotNormal => Initializer::XavierNormal { gain: 1.0 },
            Self::HeUniform => Initializer::KaimingUniform {
                gain: he_gain,
                fan_out_only: false,
            },
            Self::HeNormal => Initializer::KaimingNormal {
                gain: he_gain,
                fan_out_only: false,
            },
        }
    }
}

/// Image similarity measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageLossKind {
    /// Local normalized cross correlation.
    Lncc,
    /// Global normalized cross correlation.
    Gncc,
    /// Sum of squared differences (mean).
    Ssd,
}

string_choice!(ImageLossKind, UnknownImageLoss, {
    Lncc => ["lncc"],
    Gncc => ["gncc"],
    Ssd => ["ssd"],
});

/// Label similarity measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LabelLossKind {
    Dice,
    Jaccard,
    CrossEntropy,
    MeanSquared,
}

string_choice!(LabelLossKind, UnknownLabelLoss, {
    Dice => ["dice"],
    Jaccard => ["jaccard"],
    CrossEntropy => ["cross-entropy", "cross_entropy"],
    MeanSquared => ["mean-squared", "mean_squared"],
});

/// Deformation energy used for regularization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnergyKind {
    Bending,
    GradientL1,
    GradientL2,
}

string_choice!(EnergyKind, UnknownEnergy, {
    Bending => ["bending"],
    GradientL1 => ["gradient-l1", "gradient_l1"],
    GradientL2 => ["gradient-l2", "gradient_l2"],
});

impl EnergyKind {
    /// Minimum voxels per spatial axis for the finite differences to be defined.
    pub fn min_extent(self) -> usize {
        match self {
            Self::Bending => 5,
            Self::GradientL1 | Self::GradientL2 => 3,
        }
    }
}

/// Backbone selection and output head.
#[derive(Config, Debug)]
pub struct BackboneConfig {
    #[config(default = "BackboneKind::Local")]
    pub name: BackboneKind,
    #[config(default = "OutActivation::Linear")]
    pub out_activation: OutActivation,
    #[config(default = "KernelInit::Zeros")]
    pub out_kernel_initializer: KernelInit,
}

/// Multi-level extraction network hyperparameters.
#[derive(Config, Debug)]
pub struct LocalNetConfig {
    /// Channels at level 0; level `l` has `num_channel_initial * 2^l`.
    #[config(default = 4)]
    pub num_channel_initial: usize,
    /// Decoded levels projected to the output and averaged.
    #[config(default = "vec![0, 1, 2, 3]")]
    pub extract_levels: Vec<usize>,
    /// Encoder depth E. Defaults to the largest extraction level.
    pub depth: Option<usize>,
}

impl LocalNetConfig {
    /// Deepest encoded level E.
    pub fn max_level(&self) -> usize {
        self.depth
            .unwrap_or_else(|| self.extract_levels.iter().copied().max().unwrap_or(0))
    }

    /// Coarsest level whose decoded tensor is still used, D.
    pub fn min_level(&self) -> usize {
        self.extract_levels.iter().copied().min().unwrap_or(0)
    }

    /// Check channel width and extraction levels.
    pub fn validate(&self) -> Result<()> {
        if self.num_channel_initial == 0 {
            return Err(ModelError::invalid_configuration(
                "local.num_channel_initial must be positive",
            ));
        }
        if self.extract_levels.is_empty() {
            return Err(ModelError::invalid_configuration(
                "local.extract_levels must not be empty",
            ));
        }
        let max_level = self.max_level();
        if let Some(&level) = self.extract_levels.iter().find(|&&l| l > max_level) {
            return Err(ModelError::ExtractLevelOutOfRange { level, max_level });
        }
        Ok(())
    }
}

/// Encoder-decoder network hyperparameters.
#[derive(Config, Debug)]
pub struct UNetConfig {
    #[config(default = 4)]
    pub num_channel_initial: usize,
    /// Number of down-sampling levels.
    #[config(default = 3)]
    pub depth: usize,
    /// Concatenate skips instead of adding them.
    #[config(default = false)]
    pub concat_skip: bool,
}

impl UNetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_channel_initial == 0 {
            return Err(ModelError::invalid_configuration(
                "unet.num_channel_initial must be positive",
            ));
        }
        if self.depth == 0 {
            return Err(ModelError::invalid_configuration("unet.depth must be at least 1"));
        }
        Ok(())
    }
}

/// Image similarity term.
#[derive(Config, Debug)]
pub struct ImageSimilarityConfig {
    #[config(default = "ImageLossKind::Lncc")]
    pub name: ImageLossKind,
    #[config(default = 1.0)]
    pub weight: f64,
    /// Window edge for `lncc`.
    #[config(default = 9)]
    pub kernel_size: usize,
}

/// Label similarity term.
#[derive(Config, Debug)]
pub struct LabelSimilarityConfig {
    #[config(default = "LabelLossKind::Dice")]
    pub name: LabelLossKind,
    #[config(default = 1.0)]
    pub weight: f64,
}

#[derive(Config, Debug)]
pub struct SimilarityConfig {
    #[config(default = "ImageSimilarityConfig::new()")]
    pub image: ImageSimilarityConfig,
    #[config(default = "LabelSimilarityConfig::new()")]
    pub label: LabelSimilarityConfig,
}

/// Deformation regularization term.
#[derive(Config, Debug)]
pub struct RegularizationConfig {
    #[config(default = 0.5)]
    pub weight: f64,
    #[config(default = "EnergyKind::Bending")]
    pub energy_type: EnergyKind,
}

#[derive(Config, Debug)]
pub struct LossConfig {
    #[config(default = "SimilarityConfig::new()")]
    pub similarity: SimilarityConfig,
    #[config(default = "RegularizationConfig::new()")]
    pub regularization: RegularizationConfig,
}

impl LossConfig {
    /// Check weights and window sizes against the fixed grid.
    pub fn validate(&self, method: Method, fixed_image_size: [usize; 3]) -> Result<()> {
        let weights = [
            ("loss.similarity.image.weight", self.similarity.image.weight),
            ("loss.similarity.label.weight", self.similarity.label.weight),
            ("loss.regularization.weight", self.regularization.weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ModelError::invalid_configuration(format!(
                    "{name} must be finite and non-negative, got {weight}"
                )));
            }
        }

        let kernel_size = self.similarity.image.kernel_size;
        if self.similarity.image.name == ImageLossKind::Lncc && kernel_size % 2 == 0 {
            return Err(ModelError::invalid_configuration(format!(
                "loss.similarity.image.kernel_size must be odd, got {kernel_size}"
            )));
        }

        if method.has_field() {
            let energy = self.regularization.energy_type;
            let min_extent = energy.min_extent();
            if fixed_image_size.iter().any(|&n| n < min_extent) {
                return Err(ModelError::invalid_configuration(format!(
                    "{energy} regularization needs at least {min_extent} voxels per axis, fixed image is {fixed_image_size:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Complete model description consumed at build time.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Spatial shape of the moving image and label.
    pub moving_image_size: [usize; 3],
    /// Spatial shape of the fixed image; also the output shape.
    pub fixed_image_size: [usize; 3],
    pub method: Method,
    /// Width of the per-sample identifier tensor.
    #[config(default = 2)]
    pub index_size: usize,
    #[config(default = "BackboneConfig::new()")]
    pub backbone: BackboneConfig,
    #[config(default = "LocalNetConfig::new()")]
    pub local: LocalNetConfig,
    #[config(default = "UNetConfig::new()")]
    pub unet: UNetConfig,
    #[config(default = "LossConfig::new()")]
    pub loss: LossConfig,
    /// Scaling-and-squaring steps for `dvf`.
    #[config(default = 7)]
    pub integration_steps: usize,
}

impl ModelConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ModelError::config(e.to_string()))
    }

    /// Load a JSON file written by [`Config::save`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelError::config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Validate every section relevant to the selected method and backbone.
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("moving_image_size", self.moving_image_size),
            ("fixed_image_size", self.fixed_image_size),
        ] {
            if size.contains(&0) {
                return Err(ModelError::invalid_configuration(format!(
                    "{name} must be positive in every axis, got {size:?}"
                )));
            }
        }

        match self.backbone.name {
            BackboneKind::Local => self.local.validate()?,
            BackboneKind::UNet => self.unet.validate()?,
        }

        self.loss.validate(self.method, self.fixed_image_size)
    }
}
