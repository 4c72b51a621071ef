use crate::dataset::{Dataset, TrajectorySample};
use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Column headers, in file order.
pub const HEADER: [&str; 6] = [
    "time [s]",
    "id",
    "pos_x",
    "pos_y",
    "angle [deg]",
    "speed [m/s]",
];

/// Writes `dataset` as comma-separated rows under [`HEADER`], without an index column.
pub fn write_dataset_to<W: Write>(writer: W, dataset: &Dataset) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if dataset.is_empty() {
        wtr.write_record(HEADER)?;
    }
    for sample in dataset {
        wtr.serialize(sample)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    let file = File::create(path)?;
    write_dataset_to(BufWriter::new(file), dataset)?;
    debug!(path = %path.display(), rows = dataset.len(), "wrote dataset");
    Ok(())
}

pub fn read_dataset_from<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut dataset = Dataset::new();
    for record in rdr.deserialize::<TrajectorySample>() {
        dataset.push(record?);
    }
    Ok(dataset)
}

pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let file = File::open(path)?;
    read_dataset_from(BufReader::new(file))
}
