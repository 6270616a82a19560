// ============================================================
// Layer 3 — Volume Domain Type
// ============================================================
// Represents a single volumetric image loaded from disk.
// This is a plain data struct with no behaviour —
// just a source name, the voxel grid, and an optional
// ground-truth label grid.
//
// By the time a Volume is created, the raw file format
// (manifest + little-endian blobs) has already been decoded.

use serde::{Deserialize, Serialize};

/// A raw volumetric image in channels-first order.
///
/// Voxels are stored flat in `[channel][depth][height][width]`
/// order, so `voxels.len() == channels * d * h * w`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// The filename or path — kept for traceability
    /// so we know which scan a prediction came from
    pub source: String,

    /// Number of input channels (1 for CT, 4 for multi-modal MR, ...)
    pub channels: usize,

    /// Spatial extent as [depth, height, width]
    pub shape: [usize; 3],

    /// Flattened voxel intensities, length = channels * d * h * w
    pub voxels: Vec<f32>,

    /// Optional per-voxel class labels, length = d * h * w.
    /// Present for training data, absent for volumes to segment.
    pub labels: Option<Vec<u8>>,
}

impl Volume {
    /// Create an unlabelled Volume.
    pub fn new(
        source: impl Into<String>,
        channels: usize,
        shape: [usize; 3],
        voxels: Vec<f32>,
    ) -> Self {
        Self {
            source: source.into(),
            channels,
            shape,
            voxels,
            labels: None,
        }
    }

    /// Attach a ground-truth label grid (length must be d*h*w).
    pub fn with_labels(mut self, labels: Vec<u8>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Number of voxels per channel.
    pub fn voxel_count(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    /// True when the stored buffers are consistent with the
    /// declared shape and channel count.
    pub fn is_consistent(&self) -> bool {
        let spatial = self.voxel_count();
        self.voxels.len() == self.channels * spatial
            && self.labels.as_ref().map_or(true, |l| l.len() == spatial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_check_matches_shape() {
        let vol = Volume::new("a.json", 1, [2, 3, 4], vec![0.0; 24]);
        assert!(vol.is_consistent());
        assert_eq!(vol.voxel_count(), 24);

        let bad = Volume::new("b.json", 2, [2, 3, 4], vec![0.0; 24]);
        assert!(!bad.is_consistent());
    }

    #[test]
    fn labels_must_cover_every_voxel() {
        let vol = Volume::new("a.json", 1, [2, 2, 2], vec![0.0; 8]).with_labels(vec![0; 8]);
        assert!(vol.is_consistent());

        let bad = Volume::new("a.json", 1, [2, 2, 2], vec![0.0; 8]).with_labels(vec![0; 4]);
        assert!(!bad.is_consistent());
    }
}
