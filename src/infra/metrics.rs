// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends per-step training metrics to a CSV file.
//
// Output file: <output_dir>/metrics.csv
//
//   step,loss,captured_grads
//   1,1.873412,4
//   2,1.802277,4
//   ...
//
// The header is written once; later runs append to the same file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "step,loss,captured_grads";

/// One training step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// 1-based step number
    pub step: usize,

    /// Masked BCE loss of the step's batch
    pub loss: f64,

    /// Lookups whose gradients the debug session captured (0 without one)
    pub captured_grads: usize,
}

impl StepMetrics {
    pub fn new(step: usize, loss: f64, captured_grads: usize) -> Self {
        Self { step, loss, captured_grads }
    }

    fn csv_row(&self) -> String {
        format!("{},{:.6},{}", self.step, self.loss, self.captured_grads)
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Creates `dir` if needed and writes the header if the CSV is new.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics dir '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &StepMetrics) -> Result<()> {
        self.log_all(std::slice::from_ref(m))
    }

    /// Append several rows with a single open.
    pub fn log_all(&self, rows: &[StepMetrics]) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        for m in rows {
            writeln!(f, "{}", m.csv_row())?;
        }
        tracing::debug!("Logged {} metric rows", rows.len());
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sasrec-metrics-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_rows_are_appended_under_one_header() {
        let dir = scratch_dir("append");
        let logger = MetricsLogger::new(&dir).unwrap();
        logger.log(&StepMetrics::new(1, 0.5, 4)).unwrap();

        // A second logger on the same dir must not repeat the header
        let again = MetricsLogger::new(&dir).unwrap();
        again
            .log_all(&[StepMetrics::new(2, 0.25, 4), StepMetrics::new(3, 0.125, 0)])
            .unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![HEADER, "1,0.500000,4", "2,0.250000,4", "3,0.125000,0"]
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
