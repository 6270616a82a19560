// ============================================================
// Layer 4 — Patch Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<PatchSample>
// into GPU-ready tensors.
//
// Input:  Vec of N PatchSamples, each C x P x P x P
// Output: PatchBatch with
//   images: [N, C, P, P, P] float tensor
//   masks:  [N, P, P, P]    int tensor
//
// All patches share the same edge length (the Patcher
// guarantees it), so batching is a flatten + reshape with no
// dynamic padding.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::PatchSample;

// ─── PatchBatch ───────────────────────────────────────────────────────────────
/// A batch of patches ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct PatchBatch<B: Backend> {
    /// Voxel intensities — shape: [batch, channels, d, h, w]
    pub images: Tensor<B, 5>,

    /// Ground truth class labels — shape: [batch, d, h, w]
    pub masks: Tensor<B, 4, Int>,
}

// ─── PatchBatcher ─────────────────────────────────────────────────────────────
/// Holds the target device so tensors are created on the
/// correct GPU/CPU.
#[derive(Clone, Debug)]
pub struct PatchBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> PatchBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<PatchSample, PatchBatch<B>> for PatchBatcher<B> {
    fn batch(&self, items: Vec<PatchSample>) -> PatchBatch<B> {
        let batch_size = items.len();
        // The Patcher emits cubes of a single configured size
        let channels = items[0].channels;
        let p = items[0].size;

        let image_flat: Vec<f32> = items.iter().flat_map(|s| s.voxels.iter().copied()).collect();

        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.labels.iter().map(|&l| l as i32))
            .collect();

        let images = Tensor::<B, 1>::from_floats(image_flat.as_slice(), &self.device)
            .reshape([batch_size, channels, p, p, p]);

        let masks = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), &self.device)
            .reshape([batch_size, p, p, p]);

        PatchBatch { images, masks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn batch_shapes_are_channels_first() {
        let device = Default::default();
        let batcher = PatchBatcher::<TestBackend>::new(device);

        let sample = PatchSample {
            channels: 2,
            size: 4,
            voxels: vec![0.5; 2 * 64],
            labels: vec![1; 64],
        };
        let batch = batcher.batch(vec![sample.clone(), sample, {
            PatchSample {
                channels: 2,
                size: 4,
                voxels: vec![0.25; 2 * 64],
                labels: vec![0; 64],
            }
        }]);

        assert_eq!(batch.images.dims(), [3, 2, 4, 4, 4]);
        assert_eq!(batch.masks.dims(), [3, 4, 4, 4]);
    }
}
