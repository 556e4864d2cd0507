//! Explicit, scope-bounded training session.
//!
//! A [`TrainingSession`] owns the model, its Adam optimizer, the device and the
//! progress callbacks. Nothing is read from or written to process state; the
//! only side effects are checkpoint files under
//! [`SessionConfig::checkpoint_dir`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::{
    config::Config,
    grad_clipping::GradientClippingConfig,
    module::{AutodiffModule, Module},
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
use voxreg_model::{ModelConfig, ModelInputs, RegistrationModel};

use crate::error::{Result, TrainError};
use crate::progress::{ProgressCallback, ProgressInfo, ProgressTracker};

/// Optimizer and bookkeeping settings.
#[derive(Config, Debug)]
pub struct SessionConfig {
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    #[config(default = 0.9)]
    pub beta_1: f32,
    #[config(default = 0.999)]
    pub beta_2: f32,
    #[config(default = 1e-7)]
    pub epsilon: f32,
    /// Steps between console reports.
    #[config(default = 10)]
    pub log_interval: usize,
    /// Directory for weights and config backups; none disables checkpointing.
    pub checkpoint_dir: Option<String>,
    /// Epochs between checkpoints.
    #[config(default = 1)]
    pub save_period: usize,
    /// Clip gradients to this global L2 norm.
    pub grad_clip_norm: Option<f32>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainError::invalid_configuration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.save_period == 0 {
            return Err(TrainError::invalid_configuration("save_period must be at least 1"));
        }
        if let Some(norm) = self.grad_clip_norm {
            if !(norm > 0.0) {
                return Err(TrainError::invalid_configuration(format!(
                    "grad_clip_norm must be positive, got {norm}"
                )));
            }
        }
        Ok(())
    }

    fn adam(&self) -> AdamConfig {
        AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .with_epsilon(self.epsilon)
            .with_grad_clipping(self.grad_clip_norm.map(GradientClippingConfig::Norm))
    }
}

/// One batch of model inputs with an optional ground-truth fixed label.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    pub inputs: ModelInputs<B>,
    /// [B, f1, f2, f3]; enables the label loss and the metrics.
    pub fixed_label: Option<Tensor<B, 4>>,
}

impl<B: Backend> Batch<B> {
    pub fn new(inputs: ModelInputs<B>, fixed_label: Option<Tensor<B, 4>>) -> Self {
        Self { inputs, fixed_label }
    }
}

impl<B: AutodiffBackend> Batch<B> {
    /// Detach every tensor onto the inner backend, for validation.
    pub fn into_inner(self) -> Batch<B::InnerBackend> {
        let ModelInputs {
            moving_image,
            fixed_image,
            moving_label,
            indices,
        } = self.inputs;
        Batch {
            inputs: ModelInputs::new(
                moving_image.inner(),
                fixed_image.inner(),
                moving_label.inner(),
                indices.inner(),
            ),
            fixed_label: self.fixed_label.map(|t| t.inner()),
        }
    }
}

/// Host-side values of one step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub loss: f64,
    /// Loss terms followed by metrics, when a fixed label was given.
    pub values: Vec<(String, f64)>,
}

impl StepReport {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }
}

/// Means over the steps of one epoch.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    pub steps: usize,
    pub mean_loss: f64,
    pub means: Vec<(String, f64)>,
}

impl EpochSummary {
    fn from_reports(epoch: usize, reports: &[StepReport]) -> Result<Self> {
        if reports.is_empty() {
            return Err(TrainError::EmptyEpoch { epoch });
        }
        let steps = reports.len();
        let mut sums: Vec<(String, f64)> = Vec::new();
        for report in reports {
            for (name, value) in &report.values {
                match sums.iter_mut().find(|(n, _)| n == name) {
                    Some((_, sum)) => *sum += value,
                    None => sums.push((name.clone(), *value)),
                }
            }
        }
        let mean_loss = reports.iter().map(|r| r.loss).sum::<f64>() / steps as f64;
        let means = sums
            .into_iter()
            .map(|(name, sum)| (name, sum / steps as f64))
            .collect();
        Ok(Self {
            epoch,
            steps,
            mean_loss,
            means,
        })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.means.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }
}

/// Forward, losses and metrics of one batch, reduced to host values.
/// Returns `None` for the loss tensor when the bundle holds no terms.
fn evaluate<B: Backend>(
    model: &RegistrationModel<B>,
    batch: Batch<B>,
) -> Result<(Option<Tensor<B, 1>>, StepReport)> {
    let Batch { inputs, fixed_label } = batch;
    let output = model.forward(inputs.clone())?;
    let losses = model.losses(&inputs, &output, fixed_label.clone())?;

    let mut values = losses.to_scalars();
    if let Some(fixed_label) = fixed_label {
        values.extend(model.metrics(&output, fixed_label)?.to_scalars());
    }
    let loss = losses.total.clone().into_scalar().elem::<f64>();
    let total = (!losses.is_empty()).then_some(losses.total);
    Ok((total, StepReport { loss, values }))
}

pub struct TrainingSession<B: AutodiffBackend> {
    model: RegistrationModel<B>,
    optimizer: OptimizerAdaptor<Adam, RegistrationModel<B>, B>,
    model_config: ModelConfig,
    config: SessionConfig,
    tracker: ProgressTracker,
    device: B::Device,
    step: usize,
    epoch: usize,
}

impl<B: AutodiffBackend> TrainingSession<B> {
    /// Build the model and optimizer.
    ///
    /// When a checkpoint directory is configured it is created and both
    /// configs are written into it before training starts.
    pub fn new(model_config: &ModelConfig, config: SessionConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let model = RegistrationModel::new(model_config, device)?;
        let optimizer = config.adam().init();

        if let Some(dir) = &config.checkpoint_dir {
            let dir = Path::new(dir);
            std::fs::create_dir_all(dir)
                .map_err(|e| TrainError::checkpoint(format!("{}: {e}", dir.display())))?;
            let model_path = dir.join("model_config.json");
            model_config
                .save(&model_path)
                .map_err(|e| TrainError::checkpoint(format!("{}: {e}", model_path.display())))?;
            let session_path = dir.join("session_config.json");
            config
                .save(&session_path)
                .map_err(|e| TrainError::checkpoint(format!("{}: {e}", session_path.display())))?;
        }

        tracing::info!(
            learning_rate = config.learning_rate,
            checkpoint_dir = ?config.checkpoint_dir,
            "Created training session"
        );

        Ok(Self {
            model,
            optimizer,
            model_config: model_config.clone(),
            config,
            tracker: ProgressTracker::new(),
            device: device.clone(),
            step: 0,
            epoch: 0,
        })
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.tracker.add_callback(callback);
    }

    pub fn model(&self) -> &RegistrationModel<B> {
        &self.model
    }

    pub fn into_model(self) -> RegistrationModel<B> {
        self.model
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Optimizer steps taken so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Epochs completed so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Forward, backward and one optimizer update.
    ///
    /// A non-finite loss is reported to the callbacks and returned as an
    /// error; the weights are left untouched in that case.
    pub fn train_step(&mut self, batch: Batch<B>) -> Result<StepReport> {
        self.tracker.start();
        let (total, report) = match evaluate(&self.model, batch) {
            Ok(result) => result,
            Err(err) => {
                self.tracker.error(&err.to_string());
                return Err(err);
            }
        };

        let Some(total) = total else {
            let err = TrainError::NoLossTerms {
                step: self.step + 1,
                method: self.model.method().to_string(),
            };
            tracing::warn!(step = self.step + 1, "Skipping update");
            self.tracker.error(&err.to_string());
            return Err(err);
        };

        if !report.loss.is_finite() {
            let err = TrainError::NonFiniteLoss {
                step: self.step + 1,
                value: report.loss,
            };
            tracing::warn!(step = self.step + 1, loss = report.loss, "Skipping update");
            self.tracker.error(&err.to_string());
            return Err(err);
        }

        let grads = GradientsParams::from_grads(total.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.config.learning_rate, self.model.clone(), grads);
        self.step += 1;

        let mut info = ProgressInfo::new(
            self.step,
            self.epoch + 1,
            report.loss,
            self.tracker.elapsed(),
            self.config.learning_rate,
        );
        info.metrics = report.values.clone();
        self.tracker.update(&info);

        Ok(report)
    }

    /// Evaluate one batch without tracking gradients or updating weights.
    pub fn validate_step(&self, batch: Batch<B::InnerBackend>) -> Result<StepReport> {
        let model = self.model.valid();
        evaluate(&model, batch).map(|(_, report)| report)
    }

    /// Train on every batch, then checkpoint if the save period is reached.
    pub fn run_epoch<I>(&mut self, batches: I) -> Result<EpochSummary>
    where
        I: IntoIterator<Item = Batch<B>>,
    {
        let epoch = self.epoch + 1;
        let reports = batches
            .into_iter()
            .map(|batch| self.train_step(batch))
            .collect::<Result<Vec<_>>>()?;
        let summary = EpochSummary::from_reports(epoch, &reports)?;

        self.epoch = epoch;
        self.tracker.epoch_end(epoch, summary.mean_loss);

        if self.config.checkpoint_dir.is_some() && epoch % self.config.save_period == 0 {
            self.save_checkpoint()?;
        }
        Ok(summary)
    }

    /// Evaluate every batch on the inner backend.
    pub fn validate_epoch<I>(&self, batches: I) -> Result<EpochSummary>
    where
        I: IntoIterator<Item = Batch<B::InnerBackend>>,
    {
        let model = self.model.valid();
        let reports = batches
            .into_iter()
            .map(|batch| evaluate(&model, batch).map(|(_, report)| report))
            .collect::<Result<Vec<_>>>()?;
        let summary = EpochSummary::from_reports(self.epoch, &reports)?;
        tracing::info!(
            epoch = self.epoch,
            steps = summary.steps,
            loss = summary.mean_loss,
            "Validation"
        );
        Ok(summary)
    }

    /// Write `weights-epoch{N}.mpk` into the checkpoint directory.
    pub fn save_checkpoint(&self) -> Result<PathBuf> {
        let dir = self
            .config
            .checkpoint_dir
            .as_ref()
            .ok_or_else(|| TrainError::checkpoint("no checkpoint_dir configured"))?;
        let path = Path::new(dir).join(format!("weights-epoch{}", self.epoch));

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(path.clone(), &recorder)
            .map_err(|e| TrainError::checkpoint(format!("{}: {e}", path.display())))?;

        let path = path.with_extension("mpk");
        tracing::info!(epoch = self.epoch, path = %path.display(), "Saved checkpoint");
        Ok(path)
    }

    /// Replace the weights with a checkpoint written by [`Self::save_checkpoint`].
    pub fn load_checkpoint(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model = self
            .model
            .clone()
            .load_file(path.clone(), &recorder, &self.device)
            .map_err(|e| TrainError::checkpoint(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "Loaded checkpoint");
        Ok(())
    }
}
