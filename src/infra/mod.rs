// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   checkpoint.rs      — Saving and loading model weights with
//                        Burn's CompactRecorder, plus the
//                        TrainConfig JSON needed to rebuild the
//                        architecture at inference time.
//
//   encoder_weights.rs — Pretrained backbone restoration.
//                        Loads an encoder-only record into a
//                        freshly built model, leaving decoder
//                        and head initialisation untouched.
//
//   metrics.rs         — Training metrics logging. Writes
//                        epoch-level loss/IoU/Dice rows to a
//                        CSV file for later analysis.

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Pretrained encoder weight restoration
pub mod encoder_weights;

/// Training metrics CSV logger
pub mod metrics;
