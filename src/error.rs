use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Simulator output that cannot be turned into trajectory samples.
#[derive(Debug, Error)]
pub enum MalformedInput {
    #[error("invalid XML at byte {position}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("<{element}> attribute `{attribute}` is not a number: {value:?}")]
    InvalidNumber {
        element: String,
        attribute: &'static str,
        value: String,
    },
    #[error("vehicle id is not a non-negative number: {value:?}")]
    InvalidId { value: String },
}

/// Failures of the external simulator toolchain.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("expected output {} was not produced", path.display())]
    MissingOutput { path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed simulator output")]
    MalformedInput(#[from] MalformedInput),
    #[error(
        "no vehicle is present at t = {last_time} s \
         (is the trip duration a multiple of the time step?)"
    )]
    NoSurvivors { last_time: f64 },
    #[error("no batches were accumulated, nothing to merge")]
    EmptyAccumulator,
    #[error("batch {batch}: simulator run failed")]
    Simulator {
        batch: usize,
        #[source]
        source: SimulatorError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
