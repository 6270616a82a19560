// ============================================================
// Layer 4 — Intensity Preprocessor
// ============================================================
// Normalises raw voxel intensities before they reach the model.
//
// Raw scans arrive in wildly different intensity ranges
// (CT Hounsfield units, scanner-dependent MR intensities),
// while the network expects inputs centred around zero.
//
// Normalisation steps (applied per channel):
//   1. Clamp outliers to the [p_low, p_high] percentile window
//   2. Shift/scale to zero mean, unit variance
//
// The percentile clamp runs before standardisation so a few
// extreme voxels (metal artefacts, background padding) cannot
// dominate the computed mean and variance.

use crate::domain::volume::Volume;

/// Per-channel intensity normaliser.
pub struct Preprocessor {
    /// Lower clamp percentile in [0, 1]
    p_low: f32,

    /// Upper clamp percentile in [0, 1]
    p_high: f32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        // 0.5% / 99.5% is the usual window for medical volumes
        Self::new(0.005, 0.995)
    }
}

impl Preprocessor {
    pub fn new(p_low: f32, p_high: f32) -> Self {
        Self { p_low, p_high }
    }

    /// Normalise a volume in place and return it.
    pub fn normalize(&self, mut volume: Volume) -> Volume {
        let spatial = volume.voxel_count();
        for c in 0..volume.channels {
            let range = c * spatial..(c + 1) * spatial;
            normalize_channel(&mut volume.voxels[range], self.p_low, self.p_high);
        }
        volume
    }
}

fn normalize_channel(voxels: &mut [f32], p_low: f32, p_high: f32) {
    if voxels.is_empty() {
        return;
    }

    // ── Step 1: percentile clamp ──────────────────────────────────────────────
    let mut sorted: Vec<f32> = voxels.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let lo = sorted[percentile_index(sorted.len(), p_low)];
    let hi = sorted[percentile_index(sorted.len(), p_high)];

    for v in voxels.iter_mut() {
        *v = v.clamp(lo, hi);
    }

    // ── Step 2: zero mean, unit variance ──────────────────────────────────────
    let n = voxels.len() as f64;
    let mean = voxels.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = voxels
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    // Constant channels (all-zero padding) stay constant at zero
    let std = var.sqrt().max(1e-8);

    for v in voxels.iter_mut() {
        *v = ((*v as f64 - mean) / std) as f32;
    }
}

fn percentile_index(len: usize, p: f32) -> usize {
    (((len - 1) as f32) * p).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_channel_has_zero_mean_unit_variance() {
        let mut voxels: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        normalize_channel(&mut voxels, 0.0, 1.0);

        let n = voxels.len() as f64;
        let mean = voxels.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = voxels.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;

        assert!(mean.abs() < 1e-4);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn outliers_are_clamped_before_standardisation() {
        // One huge spike among small values
        let mut voxels = vec![1.0f32; 999];
        voxels.push(1.0e9);
        let spike_free_max = {
            let mut v = voxels.clone();
            normalize_channel(&mut v, 0.0, 0.99);
            v.iter().cloned().fold(f32::MIN, f32::max)
        };
        // With the clamp, the spike collapses onto the clamp boundary
        // instead of stretching the whole distribution
        assert!(spike_free_max < 100.0);
    }

    #[test]
    fn channels_are_normalised_independently() {
        let volume = Volume::new(
            "t.json",
            2,
            [1, 1, 4],
            vec![0.0, 1.0, 2.0, 3.0, 100.0, 101.0, 102.0, 103.0],
        );
        let normalized = Preprocessor::new(0.0, 1.0).normalize(volume);

        // Both channels have the same shape of values after z-scoring,
        // despite the offset of 100 between them
        let a = &normalized.voxels[..4];
        let b = &normalized.voxels[4..];
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
