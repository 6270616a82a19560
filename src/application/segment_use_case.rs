// ============================================================
// Layer 2 — SegmentUseCase
// ============================================================
// The inference workflow: rebuild the trained model from its
// checkpoint, segment a volume, and write the predicted mask
// back in the manifest + raw layout the loader reads.
//
// Output files for `--output out/case_pred`:
//   out/case_pred.raw    ← one u8 class label per voxel
//   out/case_pred.json   ← shape / classes / mask file name

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::loader::load_volume;
use crate::domain::segmentation::SegmentationMap;
use crate::domain::traits::Segmenter;
use crate::domain::volume::Volume;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Inferencer;

pub struct SegmentUseCase {
    inferencer: Inferencer,
}

impl SegmentUseCase {
    /// Restore the model from the checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<String>) -> Result<Self> {
        let ckpt_manager = CheckpointManager::new(checkpoint_dir);
        let inferencer = Inferencer::from_checkpoint(&ckpt_manager)?;
        Ok(Self { inferencer })
    }

    /// Segment the volume described by `manifest_path` and write
    /// the prediction next to `output_stem`.
    pub fn run(&self, manifest_path: &str, output_stem: &str) -> Result<SegmentationMap> {
        tracing::info!("Segmenting '{}'", manifest_path);

        let volume = load_volume(Path::new(manifest_path))?;
        let map = self.segment(&volume)?;

        write_prediction(Path::new(output_stem), &map)?;
        tracing::info!(
            "Wrote prediction for '{}' ({:.1}% foreground)",
            manifest_path,
            map.foreground_fraction() * 100.0,
        );

        Ok(map)
    }
}

impl Segmenter for SegmentUseCase {
    fn segment(&self, volume: &Volume) -> Result<SegmentationMap> {
        self.inferencer.predict(volume)
    }
}

/// Write a predicted mask as `<stem>.raw` plus `<stem>.json`.
fn write_prediction(stem: &Path, map: &SegmentationMap) -> Result<()> {
    if let Some(parent) = stem.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
    }

    let raw_path = PathBuf::from(format!("{}.raw", stem.display()));
    fs::write(&raw_path, &map.labels)
        .with_context(|| format!("Cannot write mask '{}'", raw_path.display()))?;

    let mask_name = raw_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "prediction.raw".to_string());

    let manifest = serde_json::json!({
        "mask": mask_name,
        "shape": map.shape,
        "classes": map.classes,
    });
    let json_path = PathBuf::from(format!("{}.json", stem.display()));
    fs::write(&json_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("Cannot write manifest '{}'", json_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_files_land_next_to_the_stem() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("nested").join("case_pred");

        let map = SegmentationMap::new([1, 2, 2], 2, vec![0, 1, 1, 0]);
        write_prediction(&stem, &map).unwrap();

        let raw = fs::read(dir.path().join("nested/case_pred.raw")).unwrap();
        assert_eq!(raw, vec![0, 1, 1, 0]);

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("nested/case_pred.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["mask"], "case_pred.raw");
        assert_eq!(manifest["classes"], 2);
    }
}
