// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish a specific goal
// (training the model or segmenting a volume).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Only workflow coordination

// The training workflow
pub mod train_use_case;

// The inference/segmentation workflow
pub mod segment_use_case;
