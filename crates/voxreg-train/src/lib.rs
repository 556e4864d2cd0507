//! Training session, progress reporting and checkpointing for voxreg models.

pub mod error;
pub mod progress;
pub mod session;

pub use error::{Result, TrainError};
pub use progress::{
    ConsoleProgressCallback, EarlyStoppingCallback, HistoryCallback, ProgressCallback, ProgressInfo,
    ProgressTracker,
};
pub use session::{Batch, EpochSummary, SessionConfig, StepReport, TrainingSession};
