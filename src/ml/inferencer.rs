// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Loads the latest checkpoint and segments whole volumes.
//
// Volumes are normalised the same way as training patches,
// zero-padded up to the next multiple of 32 so the five
// encoder/decoder levels line up, pushed through the model in
// one pass, decoded to hard labels, and cropped back to the
// original extent.

use anyhow::{bail, Result};
use burn::prelude::*;

use crate::data::patcher::pad_to_multiple;
use crate::data::preprocessor::Preprocessor;
use crate::domain::segmentation::SegmentationMap;
use crate::domain::volume::Volume;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::losses::hard_labels;
use crate::ml::model::AttentionResUnet;
use crate::ml::trainer::build_model;

type InferBackend = burn::backend::Wgpu;

/// Spatial alignment required by the five-level encoder
const ALIGN: usize = 32;

pub struct Inferencer {
    model: AttentionResUnet<InferBackend>,
    in_channels: usize,
    classes: usize,
    device: burn::backend::wgpu::WgpuDevice,
}

impl Inferencer {
    /// Rebuild the trained architecture from the stored config
    /// and restore the latest checkpoint into it.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();

        let mut cfg = ckpt_manager.load_config()?;
        // Checkpoint parameters supersede any configured weight
        // sources, and dropout is off for deterministic output
        cfg.weights = None;
        cfg.encoder_weights = None;
        cfg.dropout = 0.0;

        let model: AttentionResUnet<InferBackend> = build_model(&cfg, &device)?;
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint");

        let classes = model.classes();
        Ok(Self {
            model,
            in_channels: cfg.in_channels,
            classes,
            device,
        })
    }

    /// Segment one volume into a per-voxel label map at the
    /// volume's original resolution.
    pub fn predict(&self, volume: &Volume) -> Result<SegmentationMap> {
        if volume.channels != self.in_channels {
            bail!(
                "'{}' has {} channels, model expects {}",
                volume.source,
                volume.channels,
                self.in_channels
            );
        }

        let normalized = Preprocessor::default().normalize(volume.clone());

        let [d, h, w] = normalized.shape;
        let ([pd, ph, pw], padded) =
            pad_to_multiple(normalized.channels, normalized.shape, &normalized.voxels, ALIGN);

        let input = Tensor::<InferBackend, 1>::from_floats(padded.as_slice(), &self.device)
            .reshape([1, normalized.channels, pd, ph, pw]);

        let logits = self.model.forward_logits(input);
        let labels = hard_labels(logits);

        let flat: Vec<i64> = labels
            .into_data()
            .convert::<i64>()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Cannot read prediction tensor: {e:?}"))?;

        // Crop the padding off while flattening back to [d, h, w]
        let mut out = vec![0u8; d * h * w];
        for z in 0..d {
            for y in 0..h {
                let src = z * ph * pw + y * pw;
                let dst = z * h * w + y * w;
                for x in 0..w {
                    out[dst + x] = flat[src + x] as u8;
                }
            }
        }

        tracing::debug!(
            "Segmented '{}': {} voxels, {} foreground",
            volume.source,
            out.len(),
            out.iter().filter(|&&l| l != 0).count(),
        );

        Ok(SegmentationMap::new([d, h, w], self.classes, out))
    }
}
