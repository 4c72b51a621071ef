use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One vehicle observation at one simulation instant.
///
/// Field names match the column headers of the dataset files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    #[serde(rename = "time [s]")]
    pub time: f64,
    pub id: u64,
    pub pos_x: f64,
    pub pos_y: f64,
    /// Navigational bearing: 0 at north, clockwise, degrees.
    #[serde(rename = "angle [deg]")]
    pub angle: f64,
    #[serde(rename = "speed [m/s]")]
    pub speed: f64,
}

impl TrajectorySample {
    pub fn with_id(self, id: u64) -> Self {
        Self { id, ..self }
    }
}

/// An ordered sequence of trajectory samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    samples: Vec<TrajectorySample>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: Vec<TrajectorySample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: TrajectorySample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<TrajectorySample> {
        self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrajectorySample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Ids present anywhere in the dataset, ascending.
    pub fn distinct_ids(&self) -> BTreeSet<u64> {
        self.samples.iter().map(|s| s.id).collect()
    }

    /// True when rows are in canonical (time, id) ascending order.
    pub fn is_sorted_by_time_and_id(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| compare_time_and_id(&w[0], &w[1]).is_le())
    }
}

impl FromIterator<TrajectorySample> for Dataset {
    fn from_iter<I: IntoIterator<Item = TrajectorySample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Dataset {
    type Item = TrajectorySample;
    type IntoIter = std::vec::IntoIter<TrajectorySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a TrajectorySample;
    type IntoIter = std::slice::Iter<'a, TrajectorySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

impl Extend<TrajectorySample> for Dataset {
    fn extend<I: IntoIterator<Item = TrajectorySample>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}

fn compare_time_and_id(a: &TrajectorySample, b: &TrajectorySample) -> std::cmp::Ordering {
    a.time.total_cmp(&b.time).then(a.id.cmp(&b.id))
}

/// Returns a copy of `dataset` ordered by time, then id.
///
/// The sort is stable, so rows sharing a (time, id) key keep their input order.
pub fn sort_by_time_and_id(dataset: &Dataset) -> Dataset {
    let mut samples = dataset.samples.clone();
    samples.sort_by(compare_time_and_id);
    Dataset { samples }
}

#[cfg(test)]
pub(crate) fn sample(time: f64, id: u64) -> TrajectorySample {
    TrajectorySample {
        time,
        id,
        pos_x: id as f64,
        pos_y: time,
        angle: 90.0,
        speed: 13.9,
    }
}
