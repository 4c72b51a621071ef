use crate::dataset::{Dataset, sort_by_time_and_id};
use crate::dataset_file::write_dataset;
use crate::error::{PipelineError, Result, SimulatorError};
use crate::extract::extract_file;
use crate::merge::merge_batches;
use crate::progress::ProgressReporter;
use crate::survival::{BatchResult, survival_filter};
use crate::window::ObservationWindow;
use std::path::{Path, PathBuf};
use tracing::error;

/// Produces the raw simulator output of one batch.
pub trait BatchRunner {
    /// Runs batch `batch_index` and returns the path of its FCD output.
    fn run_batch(&mut self, batch_index: usize) -> Result<PathBuf, SimulatorError>;
}

impl<F> BatchRunner for F
where
    F: FnMut(usize) -> Result<PathBuf, SimulatorError>,
{
    fn run_batch(&mut self, batch_index: usize) -> Result<PathBuf, SimulatorError> {
        self(batch_index)
    }
}

/// Collects filtered batches until enough survivors have been gathered.
///
/// Batches are processed strictly in order: the id range handed to a batch
/// depends on the survivor count of every batch before it.
#[derive(Debug)]
pub struct BatchAccumulator {
    window: ObservationWindow,
    target: u64,
    cumulative_survivor_count: u64,
    batches: Vec<BatchResult>,
    intermediate_dir: Option<PathBuf>,
}

impl BatchAccumulator {
    pub fn new(window: ObservationWindow, target: u64) -> Self {
        Self {
            window,
            target,
            cumulative_survivor_count: 0,
            batches: Vec::new(),
            intermediate_dir: None,
        }
    }

    /// Also write each batch's extracted, sorted and filtered tables into `dir`.
    pub fn with_intermediate_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.intermediate_dir = Some(dir.into());
        self
    }

    pub fn window(&self) -> &ObservationWindow {
        &self.window
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn cumulative_survivor_count(&self) -> u64 {
        self.cumulative_survivor_count
    }

    pub fn batches(&self) -> &[BatchResult] {
        &self.batches
    }

    pub fn is_complete(&self) -> bool {
        self.cumulative_survivor_count >= self.target
    }

    /// Runs batches until the target survivor count is reached.
    ///
    /// Any failure aborts the run; batches accumulated so far are kept.
    pub fn run<R, P>(&mut self, runner: &mut R, progress: &mut P) -> Result<()>
    where
        R: BatchRunner + ?Sized,
        P: ProgressReporter + ?Sized,
    {
        while !self.is_complete() {
            let batch = self.batches.len();
            progress.batch_started(batch);

            let fcd = runner
                .run_batch(batch)
                .map_err(|source| PipelineError::Simulator { batch, source })?;
            let result = self.push_fcd(&fcd).inspect_err(|e| {
                error!(batch, fcd = %fcd.display(), "batch rejected: {}", e);
            })?;

            let n_survivors = result.n_survivors;
            progress.batch_finished(batch, n_survivors, self.cumulative_survivor_count);
        }
        Ok(())
    }

    /// Extracts, sorts and filters one finished simulator run.
    pub fn push_fcd(&mut self, fcd: &Path) -> Result<&BatchResult> {
        let raw = extract_file(fcd, self.window.trip_duration())?;
        let stem = fcd
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("mobility_{}", self.batches.len()));
        self.process(raw, &stem)
    }

    /// Processes an already extracted batch.
    pub fn push_raw(&mut self, raw: Dataset) -> Result<&BatchResult> {
        let stem = format!("mobility_{}", self.batches.len());
        self.process(raw, &stem)
    }

    fn process(&mut self, raw: Dataset, stem: &str) -> Result<&BatchResult> {
        self.keep_intermediate(&format!("{stem}.csv"), &raw)?;
        let sorted = sort_by_time_and_id(&raw);
        self.keep_intermediate(&format!("{stem}_sorted.csv"), &sorted)?;

        let result = survival_filter(&sorted, self.cumulative_survivor_count, &self.window)?;
        self.keep_intermediate(&format!("{stem}_filtered.csv"), &result.dataset)?;

        self.cumulative_survivor_count += result.n_survivors as u64;
        self.batches.push(result);
        let index = self.batches.len() - 1;
        Ok(&self.batches[index])
    }

    fn keep_intermediate(&self, name: &str, dataset: &Dataset) -> Result<()> {
        match &self.intermediate_dir {
            Some(dir) => write_dataset(&dir.join(name), dataset),
            None => Ok(()),
        }
    }

    /// Merges everything accumulated so far into the final dataset.
    pub fn finish(self) -> Result<Dataset> {
        merge_batches(self.batches.into_iter().map(|b| b.dataset))
    }
}
