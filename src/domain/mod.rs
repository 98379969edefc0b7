// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and enums describing what the recommender
// works with: id batches, masks, run modes and errors.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust data and validation
//
// The ml layer converts these host-side values into tensors.
// Every shape and id check happens here, before a device is touched.

/// Rectangular batches of item ids (log sequences, candidates)
pub mod sequence;

/// Causal attention mask and padding (timeline) mask
pub mod masks;

/// Forward modes and embedding representation selector
pub mod options;

/// Error taxonomy shared by every model entry point
pub mod error;
