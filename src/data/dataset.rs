// ============================================================
// Layer 4 — Patch Dataset
// ============================================================
// Implements Burn's Dataset trait over extracted patches so
// the DataLoader can call .get(index) and .len().

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One training patch: a fixed-size cube of voxels plus its
/// per-voxel class labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSample {
    /// Number of input channels
    pub channels: usize,

    /// Cube edge length (all three spatial dims are equal)
    pub size: usize,

    /// Voxels, flat in [channel][depth][height][width] order
    pub voxels: Vec<f32>,

    /// Class labels, flat in [depth][height][width] order
    pub labels: Vec<u8>,
}

impl PatchSample {
    /// Fraction of voxels carrying a foreground label.
    /// Useful for filtering out all-background patches.
    pub fn foreground_fraction(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        let fg = self.labels.iter().filter(|&&l| l != 0).count();
        fg as f64 / self.labels.len() as f64
    }
}

pub struct PatchDataset {
    samples: Vec<PatchSample>,
}

impl PatchDataset {
    pub fn new(samples: Vec<PatchSample>) -> Self {
        Self { samples }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Dataset<PatchSample> for PatchDataset {
    fn get(&self, index: usize) -> Option<PatchSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(labels: Vec<u8>) -> PatchSample {
        PatchSample {
            channels: 1,
            size: 2,
            voxels: vec![0.0; 8],
            labels,
        }
    }

    #[test]
    fn dataset_indexing() {
        let ds = PatchDataset::new(vec![sample(vec![0; 8]), sample(vec![1; 8])]);
        assert_eq!(ds.len(), 2);
        assert!(ds.get(1).is_some());
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn foreground_fraction() {
        let s = sample(vec![0, 0, 0, 0, 1, 1, 2, 2]);
        assert!((s.foreground_fraction() - 0.5).abs() < 1e-9);
    }
}
