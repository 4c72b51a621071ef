use crate::accumulate::{BatchAccumulator, BatchRunner};
use crate::config::RunSettings;
use crate::dataset_file::write_dataset;
use crate::error::Result;
use crate::progress::ProgressReporter;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub batches: usize,
    pub survivors: u64,
    pub rows: usize,
    pub dataset: PathBuf,
}

/// Runs batches until `target_vehicles` survivors exist, then writes the merged
/// dataset to `output.dataset`.
///
/// The dataset file is only written once every batch has succeeded.
pub fn generate_dataset<R, P>(
    settings: &RunSettings,
    runner: &mut R,
    progress: &mut P,
) -> Result<RunSummary>
where
    R: BatchRunner + ?Sized,
    P: ProgressReporter + ?Sized,
{
    let mut accumulator = BatchAccumulator::new(settings.window, settings.target_vehicles);
    if settings.output.keep_intermediates {
        std::fs::create_dir_all(&settings.output.directory)?;
        accumulator = accumulator.with_intermediate_dir(&settings.output.directory);
    }

    accumulator.run(runner, progress)?;

    let batches = accumulator.batches().len();
    let survivors = accumulator.cumulative_survivor_count();
    let dataset = accumulator.finish()?;
    write_dataset(&settings.output.dataset, &dataset)?;
    info!(
        batches,
        survivors,
        rows = dataset.len(),
        path = %settings.output.dataset.display(),
        "mobility dataset written"
    );

    Ok(RunSummary {
        batches,
        survivors,
        rows: dataset.len(),
        dataset: settings.output.dataset.clone(),
    })
}
