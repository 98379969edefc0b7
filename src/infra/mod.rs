// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File-system concerns shared by the other layers:
//
//   config_store.rs — run configuration as JSON (save / load /
//                     load_or_default)
//
//   metrics.rs      — per-step training metrics appended to a
//                     CSV file in the run's output directory
//
// Nothing here knows about Burn tensors.

/// JSON persistence for run configurations
pub mod config_store;

/// Training metrics CSV logger
pub mod metrics;
