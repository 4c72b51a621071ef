pub mod accumulate;
pub mod config;
pub mod dataset;
pub mod dataset_file;
pub mod error;
pub mod extract;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod sumo;
pub mod survival;
pub mod window;

pub use accumulate::{BatchAccumulator, BatchRunner};
pub use dataset::{Dataset, TrajectorySample, sort_by_time_and_id};
pub use error::{MalformedInput, PipelineError, SimulatorError};
pub use window::ObservationWindow;
