//! Batch prediction job run by the daily workflow
//!
//! Layout contract with the orchestrator:
//! - input:  `<input-dir>/data.csv`
//! - model:  `<model-dir>/model.pkl`
//! - output: `<output-dir>/predictions.csv`

use mlpipe_core::{load_model, threshold_labels, Dataset, PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::sensor::{deadline_after, FileSensor};
use crate::telemetry::RunContext;

pub const DATA_FILE_NAME: &str = "data.csv";
pub const MODEL_FILE_NAME: &str = "model.pkl";
pub const PREDICTIONS_FILE_NAME: &str = "predictions.csv";

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input_dir: PathBuf,
    pub model_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl BatchJob {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        model_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            model_dir: model_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.input_dir.join(DATA_FILE_NAME)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(MODEL_FILE_NAME)
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.output_dir.join(PREDICTIONS_FILE_NAME)
    }

    /// The two gating sensors: raw data and the model
    pub fn sensors(&self, poke_interval: Duration, timeout: Duration) -> [FileSensor; 2] {
        [
            FileSensor::new("wait_for_data", self.data_path(), poke_interval, timeout),
            FileSensor::new("wait_for_model", self.model_path(), poke_interval, timeout),
        ]
    }

    /// Block until both inputs exist
    ///
    /// Both sensors share one deadline of `timeout` from now, so each file
    /// must show up within `timeout` of the job starting, whichever order
    /// they arrive in.
    pub fn wait_for_inputs(&self, poke_interval: Duration, timeout: Duration) -> Result<()> {
        let deadline = deadline_after(timeout);
        for sensor in self.sensors(poke_interval, timeout) {
            sensor.wait_until(deadline)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub predictions_path: PathBuf,
    pub rows: usize,
    pub positives: usize,
}

pub fn run_batch_prediction(job: &BatchJob, ctx: &RunContext) -> Result<PredictionOutcome> {
    let _run = ctx.span().enter();
    info!(
        "Predicting {} with model {}",
        job.data_path().display(),
        job.model_path().display()
    );

    let data = Dataset::from_csv(job.data_path())?;
    let pipeline = load_model(job.model_path())?;
    info!(
        "Loaded {:?} model with {} features",
        pipeline.metadata.model_type,
        pipeline.metadata.feature_names.len()
    );

    let probabilities = pipeline.predict_proba(&data)?;
    let predictions = threshold_labels(&probabilities);

    let predictions_path = job.predictions_path();
    write_predictions(&predictions_path, &predictions, &probabilities)?;

    let positives = predictions.iter().filter(|&&p| p == 1).count();
    info!(
        "Wrote {} predictions ({} positive) to {}",
        predictions.len(),
        positives,
        predictions_path.display()
    );

    Ok(PredictionOutcome {
        predictions_path,
        rows: predictions.len(),
        positives,
    })
}

fn write_predictions(path: &Path, predictions: &[u8], probabilities: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["prediction", "probability"])?;
    for (prediction, probability) in predictions.iter().zip(probabilities) {
        writer.write_record([prediction.to_string(), probability.to_string()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| PipelineError::format(err.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| PipelineError::file(parent, err))?;
    }
    fs::write(path, bytes).map_err(|err| PipelineError::file(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_layout() {
        let job = BatchJob::new("/data/raw/2024-01-01", "/models", "/data/predictions/2024-01-01");
        assert_eq!(job.data_path(), PathBuf::from("/data/raw/2024-01-01/data.csv"));
        assert_eq!(job.model_path(), PathBuf::from("/models/model.pkl"));
        assert_eq!(
            job.predictions_path(),
            PathBuf::from("/data/predictions/2024-01-01/predictions.csv")
        );
    }

    #[test]
    fn test_write_predictions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out").join(PREDICTIONS_FILE_NAME);
        write_predictions(&path, &[1, 0], &[0.75, 0.25])?;

        let text = fs::read_to_string(&path)?;
        assert_eq!(text, "prediction,probability\n1,0.75\n0,0.25\n");
        Ok(())
    }

    #[test]
    fn test_missing_model_fails() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in");
        fs::create_dir_all(&input)?;
        fs::write(input.join(DATA_FILE_NAME), "a,b\n1,2\n")?;

        let job = BatchJob::new(&input, dir.path().join("models"), dir.path().join("out"));
        let err = run_batch_prediction(&job, &RunContext::new("predict")).unwrap_err();
        assert!(matches!(err, PipelineError::File { .. }));
        Ok(())
    }

    #[test]
    fn test_wait_for_inputs_shares_one_deadline() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let job = BatchJob::new(dir.path().join("in"), dir.path().join("models"), dir.path());
        let timeout = Duration::from_millis(200);

        // data shows up late, the model never does
        fs::create_dir_all(&job.input_dir)?;
        let data_path = job.data_path();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(120));
            fs::write(data_path, "a\n1\n")
        });

        let started = Instant::now();
        let err = job
            .wait_for_inputs(Duration::from_millis(10), timeout)
            .unwrap_err();
        writer.join().expect("writer thread panicked")?;

        assert!(matches!(err, PipelineError::Timeout(_)));
        // the model sensor does not get a fresh budget after the data lands
        assert!(started.elapsed() < timeout + Duration::from_millis(100));
        Ok(())
    }

    #[test]
    fn test_wait_for_inputs_returns_when_present() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(DATA_FILE_NAME), "a\n1\n")?;
        fs::write(dir.path().join(MODEL_FILE_NAME), "{}")?;

        let job = BatchJob::new(dir.path(), dir.path(), dir.path().join("out"));
        job.wait_for_inputs(Duration::from_millis(5), Duration::from_millis(50))?;
        Ok(())
    }
}
