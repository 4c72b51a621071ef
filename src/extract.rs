//! Flattening of SUMO floating-car-data (FCD) output into trajectory samples.
//!
//! The FCD document is a root element holding `<timestep time="..">` children,
//! each of which holds one element per observed vehicle or person:
//!
//! ```xml
//! <fcd-export>
//!     <timestep time="0.00">
//!         <vehicle id="0" x="12.5" y="80.1" angle="90.00" speed="0.00" .../>
//!     </timestep>
//! </fcd-export>
//! ```

use crate::dataset::{Dataset, TrajectorySample};
use crate::error::{MalformedInput, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

const TIMESTEP_DEPTH: usize = 2;
const OBSERVATION_DEPTH: usize = 3;

#[derive(PartialEq, Eq)]
enum Scan {
    Continue,
    Stop,
}

/// Reads an FCD file, keeping every observation with `time <= max_time`.
pub fn extract_file(path: &Path, max_time: f64) -> Result<Dataset> {
    let file = File::open(path)?;
    let dataset = extract_trajectories(BufReader::new(file), max_time)?;
    debug!(path = %path.display(), rows = dataset.len(), "extracted trajectories");
    Ok(dataset)
}

/// Flattens an FCD document into samples in document order.
///
/// Scanning stops at the first timestep later than `max_time`; timesteps are
/// expected to be strictly increasing, and the input is not re-sorted.
pub fn extract_trajectories<R: BufRead>(input: R, max_time: f64) -> Result<Dataset> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut dataset = Dataset::new();
    let mut depth = 0usize;
    let mut current_time: Option<f64> = None;

    loop {
        let scan = {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| MalformedInput::Xml {
                    position: reader.buffer_position(),
                    source,
                })?;
            let position = reader.buffer_position();

            let opened = match event {
                Event::Start(e) => {
                    depth += 1;
                    Some((e, depth))
                }
                Event::Empty(e) => Some((e, depth + 1)),
                Event::End(_) => {
                    if depth == TIMESTEP_DEPTH {
                        current_time = None;
                    }
                    depth = depth.saturating_sub(1);
                    None
                }
                Event::Eof => return Ok(dataset),
                _ => None,
            };

            match opened {
                Some((element, TIMESTEP_DEPTH)) => {
                    let time = number_attribute(&element, "time", position)?;
                    if time > max_time {
                        Scan::Stop
                    } else {
                        current_time = Some(time);
                        Scan::Continue
                    }
                }
                Some((element, OBSERVATION_DEPTH)) => {
                    if let Some(time) = current_time {
                        dataset.push(observation(&element, time, position)?);
                    }
                    Scan::Continue
                }
                _ => Scan::Continue,
            }
        };
        buf.clear();

        if scan == Scan::Stop {
            break;
        }
    }

    Ok(dataset)
}

fn observation(element: &BytesStart, time: f64, position: usize) -> Result<TrajectorySample> {
    Ok(TrajectorySample {
        time,
        id: id_attribute(element, position)?,
        pos_x: number_attribute(element, "x", position)?,
        pos_y: number_attribute(element, "y", position)?,
        angle: number_attribute(element, "angle", position)?,
        speed: number_attribute(element, "speed", position)?,
    })
}

fn element_name(element: &BytesStart) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn text_attribute(
    element: &BytesStart,
    attribute: &'static str,
    position: usize,
) -> Result<String, MalformedInput> {
    let xml_error = |source: quick_xml::Error| MalformedInput::Xml { position, source };

    let attr = element
        .try_get_attribute(attribute)
        .map_err(|e| xml_error(e.into()))?
        .ok_or_else(|| MalformedInput::MissingAttribute {
            element: element_name(element),
            attribute,
        })?;
    let value = attr.unescape_value().map_err(xml_error)?;
    Ok(value.into_owned())
}

fn number_attribute(
    element: &BytesStart,
    attribute: &'static str,
    position: usize,
) -> Result<f64, MalformedInput> {
    let value = text_attribute(element, attribute, position)?;
    match value.trim().parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(MalformedInput::InvalidNumber {
            element: element_name(element),
            attribute,
            value,
        }),
    }
}

/// Vehicle ids may be written fractionally ("3.0"); they are truncated.
fn id_attribute(element: &BytesStart, position: usize) -> Result<u64, MalformedInput> {
    let value = number_attribute(element, "id", position)?.trunc();
    if value < 0.0 {
        return Err(MalformedInput::InvalidId {
            value: text_attribute(element, "id", position)?,
        });
    }
    Ok(value as u64)
}
