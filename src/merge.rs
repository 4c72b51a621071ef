use crate::dataset::{Dataset, sort_by_time_and_id};
use crate::error::{PipelineError, Result};

/// Concatenates batch outputs in order and re-sorts them by (time, id).
pub fn merge_batches<I>(batches: I) -> Result<Dataset>
where
    I: IntoIterator<Item = Dataset>,
{
    let mut batches = batches.into_iter().peekable();
    if batches.peek().is_none() {
        return Err(PipelineError::EmptyAccumulator);
    }
    let combined: Dataset = batches.flatten().collect();
    Ok(sort_by_time_and_id(&combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sample;

    #[test]
    fn test_merge_interleaves_batches() {
        let first = Dataset::from_samples(vec![
            sample(1.0, 0),
            sample(1.0, 1),
            sample(2.0, 0),
            sample(2.0, 1),
        ]);
        let second = Dataset::from_samples(vec![sample(1.0, 2), sample(2.0, 2)]);

        let merged = merge_batches(vec![first, second]).unwrap();
        let keys: Vec<(f64, u64)> = merged.iter().map(|s| (s.time, s.id)).collect();
        assert_eq!(
            keys,
            vec![(1.0, 0), (1.0, 1), (1.0, 2), (2.0, 0), (2.0, 1), (2.0, 2)]
        );
        assert_eq!(merged.distinct_ids().len(), 3);
    }

    #[test]
    fn test_merge_single_batch() {
        let only = Dataset::from_samples(vec![sample(1.0, 4)]);
        assert_eq!(merge_batches(vec![only.clone()]).unwrap(), only);
    }

    #[test]
    fn test_merge_nothing_is_an_error() {
        assert!(matches!(
            merge_batches(Vec::<Dataset>::new()),
            Err(PipelineError::EmptyAccumulator)
        ));
    }
}
