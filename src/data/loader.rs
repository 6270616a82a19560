// ============================================================
// Layer 4 — Volume Loader
// ============================================================
// Loads volumes from a directory of JSON manifests.
//
// On-disk layout (one manifest per scan):
//   volumes/
//     case_001.json       ← manifest (shape, channels, file names)
//     case_001.raw        ← voxels, little-endian f32
//     case_001_mask.raw   ← labels, one u8 per voxel (optional)
//
// The manifest keeps the binary blobs self-describing without
// inventing a container format — the blobs are plain row-major
// dumps in [channel][depth][height][width] order.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::domain::traits::VolumeSource;
use crate::domain::volume::Volume;

/// JSON manifest describing one volume on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeManifest {
    /// Relative path of the f32 voxel blob
    pub image: String,

    /// Relative path of the u8 label blob, if this scan is annotated
    #[serde(default)]
    pub mask: Option<String>,

    /// Number of input channels
    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Spatial extent as [depth, height, width]
    pub shape: [usize; 3],
}

fn default_channels() -> usize {
    1
}

/// Loads all manifest-described volumes from a directory.
/// Implements the VolumeSource trait from Layer 3.
pub struct VolumeLoader {
    /// Path to the directory containing .json manifests
    dir: String,
}

impl VolumeLoader {
    /// Create a new VolumeLoader pointed at a directory
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: dir.into() }
    }
}

impl VolumeSource for VolumeLoader {
    fn load_all(&self) -> Result<Vec<Volume>> {
        let dir = Path::new(&self.dir);

        // A missing directory is not fatal — return an empty set so
        // callers can report "no volumes" instead of an I/O error.
        if !dir.exists() {
            tracing::warn!(
                "Volume directory '{}' does not exist — returning empty set",
                self.dir
            );
            return Ok(Vec::new());
        }

        let mut volumes = Vec::new();

        for entry in fs::read_dir(dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir))?
        {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                match load_volume(&path) {
                    Ok(vol) => {
                        tracing::debug!(
                            "Loaded: {} ({}x{}x{}, {} ch, labelled: {})",
                            vol.source,
                            vol.shape[0],
                            vol.shape[1],
                            vol.shape[2],
                            vol.channels,
                            vol.labels.is_some(),
                        );
                        volumes.push(vol);
                    }
                    // Log a warning but continue — don't fail on one bad scan
                    Err(e) => {
                        tracing::warn!("Skipping '{}': {}", path.display(), e);
                    }
                }
            }
        }

        tracing::info!("Successfully loaded {} volumes", volumes.len());
        Ok(volumes)
    }
}

/// Parse one manifest and read the blobs it references.
/// Also the single-volume entry point for inference.
pub fn load_volume(manifest_path: &Path) -> Result<Volume> {
    let json = fs::read_to_string(manifest_path)
        .with_context(|| format!("Cannot read '{}'", manifest_path.display()))?;

    let manifest: VolumeManifest = serde_json::from_str(&json)
        .with_context(|| format!("Invalid manifest '{}'", manifest_path.display()))?;

    // Blob paths are relative to the manifest's own directory
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let voxels = read_f32_blob(&base.join(&manifest.image))?;

    let expected = manifest.channels * manifest.shape.iter().product::<usize>();
    if voxels.len() != expected {
        bail!(
            "'{}': image has {} voxels, manifest shape implies {}",
            manifest.image,
            voxels.len(),
            expected
        );
    }

    let mut volume = Volume::new(
        manifest_path.display().to_string(),
        manifest.channels,
        manifest.shape,
        voxels,
    );

    if let Some(mask_file) = &manifest.mask {
        let labels = fs::read(base.join(mask_file))
            .with_context(|| format!("Cannot read mask '{}'", mask_file))?;
        if labels.len() != manifest.shape.iter().product::<usize>() {
            bail!(
                "'{}': mask has {} voxels, manifest shape implies {}",
                mask_file,
                labels.len(),
                manifest.shape.iter().product::<usize>()
            );
        }
        volume = volume.with_labels(labels);
    }

    Ok(volume)
}

/// Read a little-endian f32 blob into a Vec.
fn read_f32_blob(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).with_context(|| format!("Cannot read '{}'", path.display()))?;

    if bytes.len() % 4 != 0 {
        bail!(
            "'{}': byte length {} is not a multiple of 4",
            path.display(),
            bytes.len()
        );
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Write a little-endian f32 blob. Used by tests and by tooling
/// that converts external formats into the manifest layout.
pub fn write_f32_blob(path: &Path, data: &[f32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, bytes).with_context(|| format!("Cannot write '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_manifest_volume() {
        let dir = tempfile::tempdir().unwrap();

        let voxels: Vec<f32> = (0..8).map(|i| i as f32).collect();
        write_f32_blob(&dir.path().join("case.raw"), &voxels).unwrap();
        fs::write(dir.path().join("case_mask.raw"), vec![0u8, 1, 0, 1, 0, 1, 0, 1]).unwrap();

        let manifest = VolumeManifest {
            image: "case.raw".into(),
            mask: Some("case_mask.raw".into()),
            channels: 1,
            shape: [2, 2, 2],
        };
        fs::write(
            dir.path().join("case.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        let loaded = VolumeLoader::new(dir.path().display().to_string())
            .load_all()
            .unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].shape, [2, 2, 2]);
        assert_eq!(loaded[0].voxels, voxels);
        assert_eq!(loaded[0].labels.as_deref(), Some(&[0u8, 1, 0, 1, 0, 1, 0, 1][..]));
    }

    #[test]
    fn rejects_blob_with_wrong_size() {
        let dir = tempfile::tempdir().unwrap();

        write_f32_blob(&dir.path().join("case.raw"), &[1.0, 2.0]).unwrap();
        let manifest = VolumeManifest {
            image: "case.raw".into(),
            mask: None,
            channels: 1,
            shape: [2, 2, 2],
        };
        fs::write(
            dir.path().join("case.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        // The bad scan is skipped with a warning, not a hard failure
        let loaded = VolumeLoader::new(dir.path().display().to_string())
            .load_all()
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn missing_directory_returns_empty() {
        let loaded = VolumeLoader::new("/definitely/not/here").load_all().unwrap();
        assert!(loaded.is_empty());
    }
}
