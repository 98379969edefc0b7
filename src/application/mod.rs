// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal: a smoke "check"
// run that trains, evaluates and verifies the model end to end.
//
// Rules for this layer:
//   - No model math here (Layer 5)
//   - No printing here (Layer 1)
//   - Only workflow coordination and run configuration

/// RunConfig and the check workflow
pub mod check_use_case;
