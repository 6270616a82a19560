// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Keeping this layer pure means it is unit-testable without a
// GPU and independent of the ML framework's API churn.

// A volumetric image loaded from disk
pub mod volume;

// A dense per-voxel class labelling
pub mod segmentation;

// Core abstractions (traits) that other layers implement
pub mod traits;
