use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::window::ObservationWindow;
use std::collections::HashMap;
use tracing::{debug, warn};

/// The filtered, globally re-identified output of one simulation batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub dataset: Dataset,
    /// Number of vehicles that lasted the full trip duration.
    pub n_survivors: usize,
    /// First global id handed out to this batch's survivors.
    pub first_id: u64,
    /// Rows each survivor is expected to contribute.
    pub n_time_steps: u64,
}

impl BatchResult {
    /// Global ids assigned to this batch, `first_id..first_id + n_survivors`.
    pub fn id_range(&self) -> std::ops::Range<u64> {
        self.first_id..self.first_id + self.n_survivors as u64
    }
}

/// Keeps only vehicles observed at the last tick of the trip, trims their
/// warm-up samples and renumbers them from `cumulative_survivor_count`.
///
/// `sorted` must be one batch ordered by (time, id). Survivors are numbered in
/// the order they appear at the last tick, and row order is preserved, so every
/// time group lists the new ids in the same sequence.
pub fn survival_filter(
    sorted: &Dataset,
    cumulative_survivor_count: u64,
    window: &ObservationWindow,
) -> Result<BatchResult> {
    let mut new_ids: HashMap<u64, u64> = HashMap::new();
    for sample in sorted.iter().filter(|s| window.is_last_tick(s.time)) {
        let next = cumulative_survivor_count + new_ids.len() as u64;
        new_ids.entry(sample.id).or_insert(next);
    }

    if new_ids.is_empty() {
        return Err(PipelineError::NoSurvivors {
            last_time: window.last_time(),
        });
    }
    let n_survivors = new_ids.len();

    let dataset: Dataset = sorted
        .iter()
        .filter(|s| !window.is_warm_up(s.time) && !window.is_past_horizon(s.time))
        .filter_map(|s| new_ids.get(&s.id).map(|&id| s.with_id(id)))
        .collect();

    let n_time_steps = window.n_time_steps();
    check_row_counts(&dataset, n_time_steps);
    debug!(
        survivors = n_survivors,
        rows = dataset.len(),
        first_id = cumulative_survivor_count,
        "survival filter applied"
    );

    Ok(BatchResult {
        dataset,
        n_survivors,
        first_id: cumulative_survivor_count,
        n_time_steps,
    })
}

/// Survivors that entered late or vanished mid-trip have short trajectories.
fn check_row_counts(dataset: &Dataset, expected: u64) {
    let mut rows: HashMap<u64, u64> = HashMap::new();
    for sample in dataset {
        *rows.entry(sample.id).or_default() += 1;
    }
    let short = rows.values().filter(|&&n| n != expected).count();
    if short > 0 {
        warn!(
            survivors = short,
            expected_rows = expected,
            "survivors with an incomplete trajectory"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{TrajectorySample, sample, sort_by_time_and_id};

    fn window(trip_duration: f64, time_step: f64) -> ObservationWindow {
        ObservationWindow::new(trip_duration, time_step).unwrap()
    }

    fn grid(ids_per_tick: &[&[u64]], time_step: f64) -> Dataset {
        let mut samples = Vec::new();
        for (tick, ids) in ids_per_tick.iter().enumerate() {
            for &id in *ids {
                samples.push(sample(tick as f64 * time_step, id));
            }
        }
        sort_by_time_and_id(&Dataset::from_samples(samples))
    }

    #[test]
    fn test_two_timestep_scenario() {
        // Vehicle 2 is gone at t = 1; vehicles 1 and 3 are present there.
        let dataset = grid(&[&[1, 2], &[1, 3]], 1.0);
        let result = survival_filter(&dataset, 0, &window(2.0, 1.0)).unwrap();

        assert_eq!(result.n_survivors, 2);
        let rows: Vec<(f64, u64, f64)> =
            result.dataset.iter().map(|s| (s.time, s.id, s.pos_x)).collect();
        // pos_x carries the original id.
        assert_eq!(rows, vec![(1.0, 0, 1.0), (1.0, 1, 3.0)]);
    }

    #[test]
    fn test_single_survivor_scenario() {
        let dataset = grid(&[&[1, 2], &[1]], 1.0);
        let result = survival_filter(&dataset, 5, &window(2.0, 1.0)).unwrap();

        assert_eq!(result.n_survivors, 1);
        assert_eq!(result.dataset.len(), 1);
        let row = result.dataset.samples()[0];
        assert_eq!(row.id, 5);
        assert_eq!(row.time, 1.0);
        assert_eq!(row.pos_x, 1.0);
    }

    #[test]
    fn test_ids_offset_by_cumulative_count() {
        let dataset = grid(&[&[4, 9], &[4, 9], &[4, 9]], 1.0);
        let result = survival_filter(&dataset, 17, &window(3.0, 1.0)).unwrap();

        assert_eq!(result.n_survivors, 2);
        assert_eq!(result.first_id, 17);
        assert_eq!(result.id_range(), 17..19);
        let ids: Vec<u64> = result.dataset.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![17, 18, 17, 18]);
    }

    #[test]
    fn test_survivor_order_follows_last_tick() {
        let samples = vec![
            sample(1.0, 8),
            sample(1.0, 3),
            sample(2.0, 8),
            sample(2.0, 3),
        ];
        // Not re-sorted: survivors are numbered as first seen at the last tick.
        let dataset = Dataset::from_samples(samples);
        let result = survival_filter(&dataset, 0, &window(3.0, 1.0)).unwrap();

        let mapped: Vec<(f64, u64, f64)> =
            result.dataset.iter().map(|s| (s.time, s.id, s.pos_x)).collect();
        assert_eq!(
            mapped,
            vec![(1.0, 0, 8.0), (1.0, 1, 3.0), (2.0, 0, 8.0), (2.0, 1, 3.0)]
        );
    }

    #[test]
    fn test_each_survivor_keeps_n_time_steps_rows() {
        let time_step = 0.1;
        let window = window(3.0, time_step);
        let mut ticks: Vec<Vec<u64>> = Vec::new();
        for tick in 0..30 {
            // Vehicle 5 leaves the network at tick 20.
            let ids = if tick < 20 { vec![2, 5, 11] } else { vec![2, 11] };
            ticks.push(ids);
        }
        let refs: Vec<&[u64]> = ticks.iter().map(Vec::as_slice).collect();
        let dataset = grid(&refs, time_step);

        let result = survival_filter(&dataset, 0, &window).unwrap();
        assert_eq!(result.n_survivors, 2);
        assert_eq!(result.n_time_steps, 20);

        for id in result.id_range() {
            let times: Vec<f64> = result
                .dataset
                .iter()
                .filter(|s| s.id == id)
                .map(|s| s.time)
                .collect();
            assert_eq!(times.len() as u64, result.n_time_steps);
            for pair in times.windows(2) {
                assert!((pair[1] - pair[0] - time_step).abs() < 1e-9);
            }
            assert!(times[0] > 1.0 - time_step);
        }
    }

    #[test]
    fn test_shortest_trip_gives_every_survivor_a_row() {
        let time_step = 0.1;
        let ticks: Vec<Vec<u64>> = (0..11).map(|_| vec![7]).collect();
        let refs: Vec<&[u64]> = ticks.iter().map(Vec::as_slice).collect();
        let dataset = grid(&refs, time_step);

        let result = survival_filter(&dataset, 0, &window(1.1, time_step)).unwrap();
        assert_eq!(result.n_survivors, 1);
        assert_eq!(result.dataset.distinct_ids().len(), result.n_survivors);
        assert_eq!(result.dataset.len() as u64, result.n_time_steps);
    }

    #[test]
    fn test_rows_past_horizon_are_dropped() {
        let dataset = grid(&[&[0], &[0], &[0], &[0]], 1.0);
        let result = survival_filter(&dataset, 0, &window(3.0, 1.0)).unwrap();
        let times: Vec<f64> = result.dataset.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![1.0, 2.0]);
    }

    #[test]
    fn test_no_survivors_is_an_error() {
        let dataset = grid(&[&[1, 2]], 1.0);
        match survival_filter(&dataset, 0, &window(5.0, 1.0)) {
            Err(PipelineError::NoSurvivors { last_time }) => assert_eq!(last_time, 4.0),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_has_no_survivors() {
        assert!(matches!(
            survival_filter(&Dataset::new(), 3, &window(2.0, 1.0)),
            Err(PipelineError::NoSurvivors { .. })
        ));
    }

    #[test]
    fn test_drifted_times_match_last_tick() {
        let mut samples = Vec::new();
        let mut time = 0.0;
        for _ in 0..15 {
            samples.push(TrajectorySample { time, ..sample(0.0, 1) });
            time += 0.1;
        }
        let dataset = Dataset::from_samples(samples);
        let result = survival_filter(&dataset, 0, &window(1.5, 0.1)).unwrap();
        assert_eq!(result.n_survivors, 1);
        assert_eq!(result.dataset.len(), 5);
    }
}
