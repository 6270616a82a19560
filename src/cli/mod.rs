// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`   — trains the model on labelled volumes
//   2. `segment` — loads a checkpoint and segments a volume

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, SegmentArgs, TrainArgs};

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "volseg3d",
    version = "0.1.0",
    about = "Train a 3D attention residual U-Net on labelled volumes, then segment new ones."
)]
pub struct Cli {
    /// The subcommand to run (train or segment)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => Self::run_train(args),
            Commands::Segment(args) => Self::run_segment(args),
        }
    }

    /// Handles the `train` subcommand.
    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Starting training on volumes in: {}", args.volumes_dir);

        // Convert CLI args → application config (separates presentation from domain)
        let use_case = TrainUseCase::new(args.into());
        use_case.execute()?;

        println!("Training complete. Checkpoint saved.");
        Ok(())
    }

    /// Handles the `segment` subcommand.
    fn run_segment(args: SegmentArgs) -> Result<()> {
        use crate::application::segment_use_case::SegmentUseCase;

        let use_case = SegmentUseCase::new(args.checkpoint_dir.clone())?;
        let map = use_case.run(&args.volume, &args.output)?;

        println!(
            "\nSegmented {} voxels — {:.1}% foreground. Prediction written to '{}.raw'.",
            map.labels.len(),
            map.foreground_fraction() * 100.0,
            args.output,
        );
        Ok(())
    }
}
