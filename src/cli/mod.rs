// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   sasrec check [--config run.json] [--device cpu|wgpu] [--steps N] [--debug]
//   sasrec init-config [--path sasrec.json]

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CheckArgs, Commands, InitConfigArgs};

use crate::application::check_use_case::{CheckReport, CheckUseCase, RunConfig, EVAL_K};
use crate::infra::config_store::ConfigStore;

#[derive(Parser, Debug)]
#[command(
    name = "sasrec",
    version = "0.1.0",
    about = "Self-attentive sequential recommendation (SASRec) on Burn."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Check(args)      => run_check(args),
            Commands::InitConfig(args) => run_init_config(args),
        }
    }
}

fn run_check(args: CheckArgs) -> Result<()> {
    let mut cfg: RunConfig = match &args.config {
        Some(path) => ConfigStore::new(path).load_or_default()?,
        None       => RunConfig::default(),
    };
    if let Some(device) = args.device {
        cfg.device = device.into();
    }
    if let Some(steps) = args.steps {
        cfg.steps = steps;
    }
    cfg.debug |= args.debug;

    let report = CheckUseCase::new(cfg).execute()?;
    print_report(&report);
    Ok(())
}

fn run_init_config(args: InitConfigArgs) -> Result<()> {
    let store = ConfigStore::new(&args.path);
    store.save(&RunConfig::default())?;
    println!("Wrote default config to {}", store.path().display());
    Ok(())
}

fn print_report(r: &CheckReport) {
    println!("device         : {:?}", r.device);
    println!("steps          : {}", r.steps);
    println!("loss           : {:.4} -> {:.4}", r.first_loss, r.final_loss);
    println!(
        "eval           : {} users, HR@{EVAL_K}={:.4}, NDCG@{EVAL_K}={:.4}",
        r.ranking.cases, r.ranking.hit_rate, r.ranking.ndcg,
    );
    println!("traced lookups : {}", r.traced_lookups);
    println!("captured grads : {}", r.captured_grads);
    println!(
        "verification   : {}",
        if r.mismatches == 0 { "ok".to_string() } else { format!("{} mismatches", r.mismatches) }
    );
}
