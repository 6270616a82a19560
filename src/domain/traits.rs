// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// By programming against traits instead of concrete types,
// we can swap implementations without changing the code
// that uses them. For example:
//   - VolumeLoader implements VolumeSource
//   - A future DicomLoader could also implement VolumeSource
//   - The application layer only sees VolumeSource
//     and works with both without any changes

use crate::domain::segmentation::SegmentationMap;
use crate::domain::volume::Volume;
use anyhow::Result;

// ─── VolumeSource ─────────────────────────────────────────────────────────────
/// Any component that can load volumes from a source.
///
/// Implementations:
///   - VolumeLoader → loads manifest + raw files from a directory
///   - (future) DicomLoader → loads DICOM series
pub trait VolumeSource {
    /// Load all available volumes from this source.
    fn load_all(&self) -> Result<Vec<Volume>>;
}

// ─── Segmenter ────────────────────────────────────────────────────────────────
/// Any component that can produce a per-voxel labelling of a volume.
///
/// Implementations:
///   - SegmentUseCase → uses the attention residual U-Net
///   - (future) ThresholdSegmenter → plain intensity threshold baseline
pub trait Segmenter {
    /// Segment one volume into a dense class-label map.
    fn segment(&self, volume: &Volume) -> Result<SegmentationMap>;
}

// ─── Persistable ──────────────────────────────────────────────────────────────
/// Any component whose state can be saved and restored from disk.
///
/// Implementations:
///   - AttentionResUnet (via CheckpointManager) → saves/loads weights
///   - TrainConfig → saved as JSON next to the checkpoints
pub trait Persistable: Sized {
    /// Save this component's state to the given path
    fn save(&self, path: &str) -> Result<()>;

    /// Load a component's state from the given path.
    fn load(path: &str) -> Result<Self>;
}
