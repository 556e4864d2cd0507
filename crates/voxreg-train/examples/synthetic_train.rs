//! Train a small dvf model on synthetic blob pairs.
//!
//! ```text
//! RUST_LOG=info cargo run -p voxreg-train --example synthetic_train
//! ```

use std::sync::Arc;

use burn::backend::Autodiff;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use burn_ndarray::NdArray;
use tracing_subscriber::EnvFilter;
use voxreg_model::{LocalNetConfig, Method, ModelConfig, ModelInputs};
use voxreg_train::{
    Batch, ConsoleProgressCallback, EarlyStoppingCallback, SessionConfig, TrainingSession,
};

type MyBackend = Autodiff<NdArray<f32>>;

const SIZE: [usize; 3] = [16, 16, 16];

/// Gaussian blob of radius `sigma` centred at `centre`, [1, X, Y, Z].
fn blob<B: Backend>(centre: [f32; 3], sigma: f32, device: &B::Device) -> Tensor<B, 4> {
    let [x, y, z] = SIZE;
    let mut values = Vec::with_capacity(x * y * z);
    for i in 0..x {
        for j in 0..y {
            for k in 0..z {
                let d2 = (i as f32 - centre[0]).powi(2)
                    + (j as f32 - centre[1]).powi(2)
                    + (k as f32 - centre[2]).powi(2);
                values.push((-d2 / (2.0 * sigma * sigma)).exp());
            }
        }
    }
    Tensor::from_data(TensorData::new(values, [1, x, y, z]), device)
}

/// Moving and fixed blobs offset by `shift` voxels along x.
fn pair<B: Backend>(shift: f32, device: &B::Device) -> Batch<B> {
    let moving = blob::<B>([7.5 - shift, 7.5, 7.5], 3.0, device);
    let fixed = blob::<B>([7.5 + shift, 7.5, 7.5], 3.0, device);
    let moving_label = moving.clone().greater_elem(0.5).float();
    let fixed_label = fixed.clone().greater_elem(0.5).float();
    let indices = Tensor::zeros([1, 2], device);
    Batch::new(ModelInputs::new(moving, fixed, moving_label, indices), Some(fixed_label))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let device = Default::default();

    let mut model_config = ModelConfig::new(SIZE, SIZE, Method::Dvf);
    model_config.local = LocalNetConfig::new()
        .with_num_channel_initial(4)
        .with_extract_levels(vec![0, 1, 2]);
    model_config.loss.similarity.image.kernel_size = 5;

    let checkpoint_dir = std::env::temp_dir().join("voxreg-synthetic");
    let session_config = SessionConfig::new()
        .with_learning_rate(1e-3)
        .with_log_interval(4)
        .with_save_period(5)
        .with_checkpoint_dir(Some(checkpoint_dir.to_string_lossy().into_owned()));

    let mut session = TrainingSession::<MyBackend>::new(&model_config, session_config, &device)?;
    let stopper = EarlyStoppingCallback::new(1e-4, 3);
    session.add_callback(Arc::new(ConsoleProgressCallback::new(session.config().log_interval)));
    session.add_callback(Arc::new(stopper.clone()));

    let shifts = [0.5f32, 1.0, 1.5, 2.0];
    for _ in 0..20 {
        let summary = session.run_epoch(shifts.iter().map(|&s| pair::<MyBackend>(s, &device)))?;
        let validation = session.validate_epoch(shifts.iter().map(|&s| pair(s, &device)))?;
        tracing::info!(
            epoch = summary.epoch,
            train_loss = summary.mean_loss,
            valid_loss = validation.mean_loss,
            dice = ?validation.get("metric/dice"),
            "Epoch summary"
        );
        if stopper.should_stop() {
            break;
        }
    }

    let path = session.save_checkpoint()?;
    tracing::info!(path = %path.display(), "Final weights written");
    Ok(())
}
