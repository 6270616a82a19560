// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// What gets saved per checkpoint:
//   1. Model weights (.mpk.gz file) — all learned parameters
//   2. latest_epoch.json            — which epoch was last saved
//   3. train_config.json            — model architecture config
//
// The config is saved separately because inference has to
// rebuild the exact architecture (backbone, decoder filters,
// classes) before the weights can be loaded into it.
//
// File naming convention:
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz   ← weights after epoch 2
//     ...
//     latest_epoch.json      ← number of the latest epoch
//     train_config.json      ← architecture + hyperparameters

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use std::{fs, path::PathBuf};

use crate::application::train_use_case::TrainConfig;
use crate::domain::traits::Persistable;
use crate::ml::model::AttentionResUnet;

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager.
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Self {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    /// Save model weights for a given epoch and move the
    /// latest-epoch pointer to it.
    pub fn save_model<B: AutodiffBackend>(
        &self,
        model: &AttentionResUnet<B>,
        epoch: usize,
    ) -> Result<()> {
        // The recorder appends its own extension
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join("latest_epoch.json");
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load model weights from the latest saved checkpoint.
    ///
    /// The model argument must have the architecture the
    /// checkpoint was saved with, or loading fails.
    pub fn load_model<B: Backend>(
        &self,
        model: AttentionResUnet<B>,
        device: &B::Device,
    ) -> Result<AttentionResUnet<B>> {
        let epoch = self.latest_epoch()?;
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    /// Save the training configuration to JSON.
    /// Must run before training so inference can rebuild the
    /// exact architecture.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        cfg.save(&path.display().to_string())?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// Load the training configuration from JSON.
    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        TrainConfig::load(&path.display().to_string())
            .with_context(|| "Make sure you have run 'train' before 'segment'.")
    }

    /// Read latest_epoch.json and return the epoch number.
    fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");

        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest_epoch.json'. Have you run 'train' first?")?;

        Ok(serde_json::from_str::<usize>(&s)?)
    }
}
