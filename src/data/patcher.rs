// ============================================================
// Layer 4 — Volume Patcher
// ============================================================
// Cuts whole volumes into overlapping training patches.
//
// Whole scans rarely fit GPU memory, so training runs on
// fixed-size cubes sampled from each volume. The encoder
// downsamples five times, so the patch edge must be divisible
// by 32 for the skip resolutions to line up.
//
// Tiling rules per axis:
//   - tiles start every `patch - overlap` voxels
//   - the final tile is shifted flush with the volume edge so
//     every voxel is covered exactly once by some tile start
//   - volumes smaller than the patch are zero-padded up to it
//
// The same zero-padding helper serves the inferencer, which
// pads whole volumes up to the next multiple of 32.

use crate::data::dataset::PatchSample;
use crate::domain::volume::Volume;

/// Overlapping fixed-size patch extractor.
pub struct Patcher {
    /// Cube edge length of each patch (must be a multiple of 32)
    patch: usize,

    /// Overlap between neighbouring patches, in voxels
    overlap: usize,
}

impl Patcher {
    pub fn new(patch: usize, overlap: usize) -> Self {
        // An overlap >= patch would loop forever; cap it
        let overlap = overlap.min(patch.saturating_sub(1));
        Self { patch, overlap }
    }

    /// Tile start offsets along one axis of length `dim`.
    pub fn tile_starts(&self, dim: usize) -> Vec<usize> {
        if dim <= self.patch {
            return vec![0];
        }
        let stride = self.patch - self.overlap;
        let mut starts: Vec<usize> = (0..dim - self.patch).step_by(stride).collect();
        // Final tile flush with the edge
        starts.push(dim - self.patch);
        starts.dedup();
        starts
    }

    /// Extract all labelled patches from a volume.
    ///
    /// Volumes without labels produce no patches — there is
    /// nothing to supervise on.
    pub fn patches(&self, volume: &Volume) -> Vec<PatchSample> {
        let labels = match &volume.labels {
            Some(l) => l,
            None => {
                tracing::warn!("'{}' has no labels — skipped for training", volume.source);
                return Vec::new();
            }
        };

        let [d, h, w] = volume.shape;
        let mut samples = Vec::new();

        for &zs in &self.tile_starts(d) {
            for &ys in &self.tile_starts(h) {
                for &xs in &self.tile_starts(w) {
                    samples.push(self.extract(volume, labels, [zs, ys, xs]));
                }
            }
        }

        samples
    }

    /// Copy one patch (zero-padded where it overhangs the volume).
    fn extract(&self, volume: &Volume, labels: &[u8], start: [usize; 3]) -> PatchSample {
        let p = self.patch;
        let [d, h, w] = volume.shape;
        let spatial = d * h * w;

        let mut voxels = vec![0.0f32; volume.channels * p * p * p];
        let mut patch_labels = vec![0u8; p * p * p];

        for z in 0..p.min(d - start[0].min(d)) {
            for y in 0..p.min(h - start[1].min(h)) {
                let src_row = (start[0] + z) * h * w + (start[1] + y) * w + start[2];
                let row_len = p.min(w - start[2].min(w));
                let dst_row = z * p * p + y * p;

                for c in 0..volume.channels {
                    let src = c * spatial + src_row;
                    let dst = c * p * p * p + dst_row;
                    voxels[dst..dst + row_len].copy_from_slice(&volume.voxels[src..src + row_len]);
                }
                patch_labels[dst_row..dst_row + row_len]
                    .copy_from_slice(&labels[src_row..src_row + row_len]);
            }
        }

        PatchSample {
            channels: volume.channels,
            size: p,
            voxels,
            labels: patch_labels,
        }
    }
}

/// Zero-pad a channels-first volume so each spatial dim becomes a
/// multiple of `multiple`. Returns the padded shape and buffer.
pub fn pad_to_multiple(
    channels: usize,
    shape: [usize; 3],
    voxels: &[f32],
    multiple: usize,
) -> ([usize; 3], Vec<f32>) {
    let round_up = |v: usize| v.div_ceil(multiple) * multiple;
    let [d, h, w] = shape;
    let [pd, ph, pw] = [round_up(d), round_up(h), round_up(w)];

    if [pd, ph, pw] == shape {
        return (shape, voxels.to_vec());
    }

    let mut padded = vec![0.0f32; channels * pd * ph * pw];
    for c in 0..channels {
        for z in 0..d {
            for y in 0..h {
                let src = c * d * h * w + z * h * w + y * w;
                let dst = c * pd * ph * pw + z * ph * pw + y * pw;
                padded[dst..dst + w].copy_from_slice(&voxels[src..src + w]);
            }
        }
    }
    ([pd, ph, pw], padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_starts_cover_the_axis() {
        let patcher = Patcher::new(32, 8);
        let starts = patcher.tile_starts(70);
        assert_eq!(starts.first(), Some(&0));
        // Last tile flush with the edge: 70 - 32
        assert_eq!(starts.last(), Some(&38));
        // Every voxel falls inside at least one tile
        for v in 0..70 {
            assert!(starts.iter().any(|&s| v >= s && v < s + 32));
        }
    }

    #[test]
    fn small_axis_yields_single_tile() {
        let patcher = Patcher::new(32, 8);
        assert_eq!(patcher.tile_starts(20), vec![0]);
        assert_eq!(patcher.tile_starts(32), vec![0]);
    }

    #[test]
    fn undersized_volume_is_zero_padded() {
        let volume = Volume::new("t.json", 1, [2, 2, 2], vec![1.0; 8]).with_labels(vec![1; 8]);
        let patches = Patcher::new(4, 0).patches(&volume);

        assert_eq!(patches.len(), 1);
        let p = &patches[0];
        assert_eq!(p.size, 4);
        // 8 real voxels, 56 padded zeros
        let ones = p.voxels.iter().filter(|&&v| v == 1.0).count();
        assert_eq!(ones, 8);
        assert_eq!(p.labels.iter().filter(|&&l| l == 1).count(), 8);
    }

    #[test]
    fn patch_values_match_source_volume() {
        // 1x4x4x4 volume with voxel value = linear index
        let voxels: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let labels: Vec<u8> = (0..64).map(|i| (i % 2) as u8).collect();
        let volume = Volume::new("t.json", 1, [4, 4, 4], voxels).with_labels(labels);

        let patches = Patcher::new(2, 0).patches(&volume);
        assert_eq!(patches.len(), 8);

        // First patch is the [0..2, 0..2, 0..2] corner
        let corner = &patches[0];
        assert_eq!(
            corner.voxels,
            vec![0.0, 1.0, 4.0, 5.0, 16.0, 17.0, 20.0, 21.0]
        );
    }

    #[test]
    fn unlabelled_volume_produces_no_patches() {
        let volume = Volume::new("t.json", 1, [4, 4, 4], vec![0.0; 64]);
        assert!(Patcher::new(2, 0).patches(&volume).is_empty());
    }

    #[test]
    fn pad_to_multiple_preserves_content() {
        let voxels: Vec<f32> = (0..8).map(|i| i as f32 + 1.0).collect();
        let (shape, padded) = pad_to_multiple(1, [2, 2, 2], &voxels, 4);

        assert_eq!(shape, [4, 4, 4]);
        assert_eq!(padded.len(), 64);
        // Original corner survives in place
        assert_eq!(padded[0], 1.0);
        assert_eq!(padded[1], 2.0);
        assert_eq!(padded[4], 3.0);
        // Sum unchanged — everything else is zero
        let total: f32 = padded.iter().sum();
        assert_eq!(total, voxels.iter().sum::<f32>());
    }
}
