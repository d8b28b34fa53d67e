//! mlpipe trainer - training runs and batch prediction
//!
//! Ties the `mlpipe-core` building blocks into the two jobs the workflow
//! runs: `train_pipeline` and `run_batch_prediction`, plus the file sensor
//! that gates the latter.

pub mod predict;
pub mod sensor;
pub mod telemetry;
pub mod train;

pub use predict::{run_batch_prediction, BatchJob, PredictionOutcome};
pub use sensor::FileSensor;
pub use telemetry::{init_tracing, RunContext};
pub use train::{train_pipeline, TrainOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
