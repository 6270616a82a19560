// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `segment`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)

use crate::application::train_use_case::TrainConfig;
use clap::{Args, Subcommand};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the attention residual U-Net on labelled volumes
    Train(TrainArgs),

    /// Segment a volume using a trained checkpoint
    Segment(SegmentArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory of volume manifests (.json + .raw files)
    #[arg(long, default_value = "data/volumes")]
    pub volumes_dir: String,

    /// Directory to save model checkpoints and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Number of input channels per voxel
    #[arg(long, default_value_t = 1)]
    pub in_channels: usize,

    /// Number of output classes (1 = binary foreground)
    #[arg(long, default_value_t = 1)]
    pub classes: usize,

    /// Backbone encoder: vgg16 or resnet18
    #[arg(long, default_value = "vgg16")]
    pub backbone: String,

    /// Final activation: sigmoid, softmax or linear
    #[arg(long, default_value = "sigmoid")]
    pub activation: String,

    /// Path to full-model weights to start from (Burn record)
    #[arg(long)]
    pub weights: Option<String>,

    /// Path to pretrained encoder weights (Burn record)
    #[arg(long)]
    pub encoder_weights: Option<String>,

    /// Freeze the encoder — train the decoder only
    #[arg(long)]
    pub encoder_freeze: bool,

    /// Filters per decoder stage, deepest first.
    /// Five stages restore full resolution
    #[arg(long, value_delimiter = ',', default_values_t = [256, 128, 64, 32, 16])]
    pub decoder_filters: Vec<usize>,

    /// Batch-norm between decoder convs and activations
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub decoder_batchnorm: bool,

    /// Dropout rate after the decoder pyramid (0 disables)
    #[arg(long, default_value_t = 0.0)]
    pub dropout: f64,

    /// Training patch edge length — must be a multiple of 32
    #[arg(long, default_value_t = 64)]
    pub patch_size: usize,

    /// Overlap between neighbouring patches, in voxels
    #[arg(long, default_value_t = 16)]
    pub patch_overlap: usize,

    /// Number of patches processed together in one forward pass
    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    /// Number of full passes through the training patches
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 2e-4)]
    pub lr: f64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            volumes_dir: a.volumes_dir,
            checkpoint_dir: a.checkpoint_dir,
            in_channels: a.in_channels,
            classes: a.classes,
            backbone: a.backbone,
            activation: a.activation,
            weights: a.weights,
            encoder_weights: a.encoder_weights,
            encoder_freeze: a.encoder_freeze,
            decoder_filters: a.decoder_filters,
            decoder_batchnorm: a.decoder_batchnorm,
            dropout: a.dropout,
            patch_size: a.patch_size,
            patch_overlap: a.patch_overlap,
            batch_size: a.batch_size,
            epochs: a.epochs,
            lr: a.lr,
        }
    }
}

/// All arguments for the `segment` command
#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Manifest (.json) of the volume to segment
    #[arg(long)]
    pub volume: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Output stem — prediction lands at <stem>.raw / <stem>.json
    #[arg(long, default_value = "prediction")]
    pub output: String,
}
