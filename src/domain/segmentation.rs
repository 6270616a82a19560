// ============================================================
// Layer 3 — SegmentationMap Domain Type
// ============================================================
// Represents a predicted segmentation in domain terms:
// one class label per voxel, at the same spatial resolution
// as the input volume.
//
// This is semantic segmentation — the model does not detect
// object instances, it assigns every voxel to one of
// `classes` categories (class 0 is background by convention).

use serde::{Deserialize, Serialize};

/// A dense per-voxel labelling of a volume.
///
/// Labels are class indices into `0..classes`, stored flat in
/// `[depth][height][width]` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMap {
    /// Spatial extent as [depth, height, width] — matches the
    /// volume this map was predicted for
    pub shape: [usize; 3],

    /// Number of classes the model distinguishes
    pub classes: usize,

    /// One class index per voxel, length = d * h * w
    pub labels: Vec<u8>,
}

impl SegmentationMap {
    pub fn new(shape: [usize; 3], classes: usize, labels: Vec<u8>) -> Self {
        Self {
            shape,
            classes,
            labels,
        }
    }

    /// Number of voxels assigned to each class.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes];
        for &l in &self.labels {
            if (l as usize) < self.classes {
                counts[l as usize] += 1;
            }
        }
        counts
    }

    /// Fraction of voxels assigned to a foreground class (not 0).
    pub fn foreground_fraction(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        let fg = self.labels.iter().filter(|&&l| l != 0).count();
        fg as f64 / self.labels.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_counts_cover_all_voxels() {
        let map = SegmentationMap::new([1, 2, 2], 3, vec![0, 1, 1, 2]);
        assert_eq!(map.class_counts(), vec![1, 2, 1]);
    }

    #[test]
    fn foreground_fraction_ignores_background() {
        let map = SegmentationMap::new([1, 2, 2], 2, vec![0, 0, 1, 1]);
        assert!((map.foreground_fraction() - 0.5).abs() < 1e-9);
    }
}
