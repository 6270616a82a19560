// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch, so
// learning curves can be plotted and training runs compared
// without re-parsing console output.
//
// Metrics recorded per epoch:
//   - epoch:      the epoch number (1, 2, 3, ...)
//   - train_loss: average combined CE/BCE + Dice loss (train)
//   - val_loss:   the same loss on the validation patches
//   - mean_iou:   mean intersection-over-union on validation
//   - mean_dice:  mean Dice coefficient on validation
//
// Output file: checkpoints/metrics.csv

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average combined loss over all training batches
    pub train_loss: f64,

    /// Average combined loss on the validation set.
    /// Divergence from train_loss indicates overfitting
    pub val_loss: f64,

    /// Mean IoU over classes on validation patches, in [0, 1]
    pub mean_iou: f64,

    /// Mean Dice coefficient on validation patches, in [0, 1]
    pub mean_dice: f64,
}

impl EpochMetrics {
    pub fn new(
        epoch: usize,
        train_loss: f64,
        val_loss: f64,
        mean_iou: f64,
        mean_dice: f64,
    ) -> Self {
        Self {
            epoch,
            train_loss,
            val_loss,
            mean_iou,
            mean_dice,
        }
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");

        // Header only for a new file, so runs can append
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,val_loss,mean_iou,mean_dice")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.val_loss, m.mean_iou, m.mean_dice,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );

        Ok(())
    }

    /// Path of the metrics CSV file
    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 2.5, 2.3, 0.4, 0.5);
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn csv_gets_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().display().to_string()).unwrap();

        logger
            .log(&EpochMetrics::new(1, 1.5, 1.6, 0.3, 0.4))
            .unwrap();
        logger
            .log(&EpochMetrics::new(2, 1.2, 1.4, 0.4, 0.5))
            .unwrap();

        let contents = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "epoch,train_loss,val_loss,mean_iou,mean_dice");
        assert!(lines[1].starts_with("1,1.5"));
    }
}
