// ============================================================
// Layer 6 — Encoder Weight Store
// ============================================================
// Restores pretrained backbone weights into a freshly built
// model. The record file is a plain Burn CompactRecorder dump
// of an Encoder module — typically exported from an earlier
// training run or converted from an external source.
//
// Only the encoder half of the model is touched; decoder and
// head keep their fresh initialisation. The record's backbone
// architecture must match the model's, which is the same
// type-level guarantee Burn gives full checkpoints.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::path::Path;

use crate::ml::model::AttentionResUnet;

/// Load encoder parameters from a record file into `model`.
pub fn restore_encoder<B: Backend>(
    mut model: AttentionResUnet<B>,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<AttentionResUnet<B>> {
    let path = path.as_ref();

    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .with_context(|| {
            format!(
                "Cannot load encoder weights from '{}'. \
                 Expected a Burn record of a matching backbone.",
                path.display()
            )
        })?;

    model.encoder = model.encoder.load_record(record);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::AttentionResUnetConfig;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn encoder_record_roundtrips_into_a_fresh_model() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder");

        // Export the encoder of one model...
        let source: AttentionResUnet<TestBackend> =
            AttentionResUnetConfig::new(1, 2).init(&device);
        CompactRecorder::new()
            .record(source.encoder.clone().into_record(), path.clone())
            .unwrap();

        // ...and restore it into another
        let fresh: AttentionResUnet<TestBackend> = AttentionResUnetConfig::new(1, 2).init(&device);
        let restored = restore_encoder(fresh, &path, &device);
        assert!(restored.is_ok());
    }

    #[test]
    fn missing_record_is_a_readable_error() {
        let device = Default::default();
        let model: AttentionResUnet<TestBackend> = AttentionResUnetConfig::new(1, 2).init(&device);

        let err = restore_encoder(model, "/no/such/encoder", &device).unwrap_err();
        assert!(err.to_string().contains("encoder weights"));
    }
}
