// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
//
// What's in this layer:
//
//   blocks.rs     — Convolutional building blocks:
//                   • ConvBnRelu (3x3x3 conv + BN + ReLU)
//                   • ResConvBlock (residual double conv)
//                   • GatingSignal (1x1x1 gating projection)
//                   • AttentionGate (additive attention)
//                   • 3D nearest upsampling / max-pooling
//
//   backbone.rs   — Encoder factory keyed by name:
//                   VGG16 and ResNet-18 in their 3D forms,
//                   exposing multi-scale skip activations
//
//   model.rs      — The assembled AttentionResUnet:
//                   center block, attention-gated decoder
//                   pyramid, prediction head, final activation
//
//   losses.rs     — CE/BCE + soft Dice training loss,
//                   IoU/Dice validation scores
//
//   trainer.rs    — The training loop: Adam, DataLoader,
//                   validation pass, checkpoints, metrics CSV
//
//   inferencer.rs — Whole-volume segmentation from the latest
//                   checkpoint
//
// Reference: Oktay et al. (2018) Attention U-Net
//            Ronneberger et al. (2015) U-Net

/// Convolutional and attention building blocks
pub mod blocks;

/// Backbone encoders (VGG16, ResNet-18) and their factory
pub mod backbone;

/// The assembled attention residual U-Net
pub mod model;

/// Training losses and evaluation scores
pub mod losses;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference engine — loads a checkpoint and segments volumes
pub mod inferencer;
