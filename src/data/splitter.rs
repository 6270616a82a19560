// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples and splits them into two sets:
//   - Training set:   used to update model weights
//   - Validation set: used to measure Dice/IoU on unseen data
//
// Patches are shuffled before splitting because consecutive
// patches come from the same scan; without shuffling, the
// validation set would hold entire scans the training set
// never resembles (or worse, nothing but edge tiles).

use rand::seq::SliceRandom;

/// Randomly shuffle `samples` and split into (train, validation).
///
/// `train_fraction` is the proportion kept for training,
/// e.g. 0.8 keeps 80% for training and 20% for validation.
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64) -> (Vec<T>, Vec<T>) {
    let mut rng = rand::thread_rng();
    samples.shuffle(&mut rng);

    let total = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);
    (samples, val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sizes_follow_the_fraction() {
        let samples: Vec<usize> = (0..100).collect();
        let (train, val) = split_train_val(samples, 0.8);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(), 20);
    }

    #[test]
    fn no_sample_is_lost_or_duplicated() {
        let samples: Vec<usize> = (0..50).collect();
        let (train, val) = split_train_val(samples, 0.7);

        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn extreme_fractions_are_safe() {
        let (train, val) = split_train_val((0..10).collect::<Vec<usize>>(), 1.0);
        assert_eq!((train.len(), val.len()), (10, 0));

        let (train, val) = split_train_val((0..10).collect::<Vec<usize>>(), 0.0);
        assert_eq!((train.len(), val.len()), (0, 10));
    }
}
