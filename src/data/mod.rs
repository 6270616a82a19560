// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw files on disk to GPU-ready tensor
// batches, in this order:
//
//   manifest + raw blobs
//       │
//       ▼
//   VolumeLoader      → reads manifests, decodes voxel blobs
//       │
//       ▼
//   Preprocessor      → clamps outliers, z-scores intensities
//       │
//       ▼
//   Patcher           → cuts volumes into overlapping cubes
//       │
//       ▼
//   PatchDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   PatchBatcher      → stacks patches into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Each module is responsible for exactly one step.

/// Loads manifest-described volumes from a directory
pub mod loader;

/// Clamps and z-scores voxel intensities per channel
pub mod preprocessor;

/// Cuts volumes into overlapping fixed-size patches
pub mod patcher;

/// Implements Burn's Dataset trait for patches
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits patches into train/validation sets
pub mod splitter;
