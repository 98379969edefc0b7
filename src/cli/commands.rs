// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// `check` and `init-config`, and their flags.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::check_use_case::DeviceKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a few steps on synthetic data, evaluate, and verify lookups
    Check(CheckArgs),

    /// Write a default run configuration to a JSON file
    InitConfig(InitConfigArgs),
}

/// Arguments for `check`. Flags given here override the config file.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Run configuration JSON (defaults are used if it does not exist)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tensor backend
    #[arg(long, value_enum)]
    pub device: Option<DeviceArg>,

    /// Number of training steps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Trace embedding lookups and capture their gradients
    #[arg(long)]
    pub debug: bool,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the config
    #[arg(long, default_value = "sasrec.json")]
    pub path: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceArg {
    Cpu,
    Wgpu,
}

/// The application layer never sees clap types.
impl From<DeviceArg> for DeviceKind {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Cpu  => DeviceKind::Cpu,
            DeviceArg::Wgpu => DeviceKind::Wgpu,
        }
    }
}
