//! `hdx-fit global`: second-stage fit from a user supplied deltaG guess.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use log::info;

use hdx_core::serde::to_yaml_string;
use hdx_global::{FitResult, GlobalDeltaGOptimizer, NullObserver};

use super::{load_deltag, load_measurements, load_rates, write_text};
use crate::config::HdxConfig;

/// Arguments of `hdx-fit global`.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Uniform peptide table (`state,exposure,start,end,sequence,uptake,uptake_sd`).
    #[arg(long)]
    pub data: PathBuf,
    /// Intrinsic rate table `r_number,k_int`.
    #[arg(long = "k-int")]
    pub k_int: PathBuf,
    /// Initial deltaG table `r_number,dG` in J/mol.
    #[arg(long)]
    pub initial: PathBuf,
    /// YAML run configuration; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output directory for `fit.csv`, `losses.csv` and `result.json`.
    #[arg(long)]
    pub out: PathBuf,
    /// Overrides `global.epochs` of the configuration.
    #[arg(long)]
    pub epochs: Option<usize>,
}

/// Writes the residue table, loss curve and canonical JSON of `result`
/// next to the resolved configuration.
pub fn write_result(out: &Path, config: &HdxConfig, result: &FitResult) -> Result<(), Box<dyn Error>> {
    write_text(&out.join("config.yaml"), &to_yaml_string(config)?)?;
    write_text(&out.join("fit.csv"), &result.to_delimited()?)?;
    write_text(&out.join("losses.csv"), &result.losses_to_delimited()?)?;
    let json = String::from_utf8(result.to_canonical_json()?)?;
    write_text(&out.join("result.json"), &json)?;
    Ok(())
}

/// Runs `hdx-fit global`.
pub fn run(args: &GlobalArgs) -> Result<(), Box<dyn Error>> {
    let mut config = HdxConfig::load(args.config.as_deref())?;
    if let Some(epochs) = args.epochs {
        config.global.epochs = epochs;
    }
    config.global.check_device()?;
    let set = load_measurements(&args.data, &config)?;
    let rates = load_rates(&args.k_int)?;
    let initial = load_deltag(&args.initial)?;

    let result = GlobalDeltaGOptimizer::for_set(&set, &[rates], &initial, config.global.clone())?
        .run(&mut NullObserver)?;
    info!(
        "global fit stopped: {} after {} epochs",
        result.stop_reason().as_str(),
        result.convergence().epochs_run
    );
    write_result(&args.out, &config, &result)
}
