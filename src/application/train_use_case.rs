// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load volumes               (Layer 4 - data)
//   Step 2: Normalise intensities      (Layer 4 - data)
//   Step 3: Cut into patches           (Layer 4 - data)
//   Step 4: Split train/validation     (Layer 4 - data)
//   Step 5: Build datasets             (Layer 4 - data)
//   Step 6: Save config                (Layer 6 - infra)
//   Step 7: Run training loop          (Layer 5 - ml)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::data::{
    dataset::PatchDataset, loader::VolumeLoader, patcher::Patcher, preprocessor::Preprocessor,
    splitter::split_train_val,
};
use crate::domain::traits::{Persistable, VolumeSource};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything needed to rebuild the architecture and rerun the
// pipeline, serialisable so it can be stored with checkpoints
// and reloaded for inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub volumes_dir: String,
    pub checkpoint_dir: String,
    pub in_channels: usize,
    pub classes: usize,
    pub backbone: String,
    pub activation: String,
    pub weights: Option<String>,
    pub encoder_weights: Option<String>,
    pub encoder_freeze: bool,
    pub decoder_filters: Vec<usize>,
    pub decoder_batchnorm: bool,
    pub dropout: f64,
    pub patch_size: usize,
    pub patch_overlap: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub lr: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            volumes_dir: "data/volumes".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            in_channels: 1,
            classes: 1,
            backbone: "vgg16".to_string(),
            activation: "sigmoid".to_string(),
            weights: None,
            encoder_weights: None,
            encoder_freeze: false,
            decoder_filters: vec![256, 128, 64, 32, 16],
            decoder_batchnorm: true,
            dropout: 0.0,
            patch_size: 64,
            patch_overlap: 16,
            batch_size: 2,
            epochs: 10,
            lr: 2e-4,
        }
    }
}

impl Persistable for TrainConfig {
    fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Cannot write config to '{path}'"))
    }

    fn load(path: &str) -> Result<Self> {
        let json =
            fs::read_to_string(path).with_context(|| format!("Cannot read config from '{path}'"))?;
        Ok(serde_json::from_str(&json)?)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // The encoder pools five times, so patches must align to 32
        if cfg.patch_size == 0 || cfg.patch_size % 32 != 0 {
            bail!(
                "patch_size must be a positive multiple of 32, got {}",
                cfg.patch_size
            );
        }

        // ── Step 1: Load all volumes ─────────────────────────────────────────
        tracing::info!("Loading volumes from '{}'", cfg.volumes_dir);
        let loader = VolumeLoader::new(&cfg.volumes_dir);
        let raw_volumes = loader.load_all()?;
        if raw_volumes.is_empty() {
            bail!("No volumes found in '{}'", cfg.volumes_dir);
        }
        tracing::info!("Loaded {} volumes", raw_volumes.len());

        // ── Step 2: Normalise intensities ────────────────────────────────────
        let preprocessor = Preprocessor::default();
        let volumes: Vec<_> = raw_volumes
            .into_iter()
            .map(|v| preprocessor.normalize(v))
            .collect();

        // ── Step 3: Cut volumes into overlapping patches ─────────────────────
        let patcher = Patcher::new(cfg.patch_size, cfg.patch_overlap);
        let patches: Vec<_> = volumes.iter().flat_map(|v| patcher.patches(v)).collect();
        if patches.is_empty() {
            bail!("No labelled patches — do the volumes have masks?");
        }
        tracing::info!("Extracted {} training patches", patches.len());

        // ── Step 4: Train / validation split (80/20) ─────────────────────────
        let (train_patches, val_patches) = split_train_val(patches, 0.8);
        tracing::info!(
            "Split: {} train, {} validation",
            train_patches.len(),
            val_patches.len()
        );

        // ── Step 5: Build Burn datasets ──────────────────────────────────────
        let train_dataset = PatchDataset::new(train_patches);
        let val_dataset = PatchDataset::new(val_patches);

        // ── Step 6: Save config for inference ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt_manager.save_config(cfg)?;

        // ── Step 7: Run training loop (Layer 5) ──────────────────────────────
        run_training(cfg, train_dataset, val_dataset, ckpt_manager)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misaligned_patch_size_is_rejected() {
        let cfg = TrainConfig {
            patch_size: 48,
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(err.to_string().contains("multiple of 32"));
    }

    #[test]
    fn config_persists_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json").display().to_string();

        let cfg = TrainConfig {
            classes: 4,
            backbone: "resnet18".to_string(),
            ..TrainConfig::default()
        };
        cfg.save(&path).unwrap();

        let loaded = TrainConfig::load(&path).unwrap();
        assert_eq!(loaded.classes, 4);
        assert_eq!(loaded.backbone, "resnet18");
    }
}
