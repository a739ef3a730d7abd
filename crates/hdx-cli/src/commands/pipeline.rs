//! `hdx-fit pipeline`: both stages in one go.

use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use log::info;

use hdx_global::{fit_deltag_global_batch, DeltaGField};

use super::global::write_result;
use super::guess::fit_states;
use super::{load_measurements, load_rates, write_text};
use crate::config::HdxConfig;

/// Arguments of `hdx-fit pipeline`.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Uniform peptide table (`state,exposure,start,end,sequence,uptake,uptake_sd`).
    #[arg(long)]
    pub data: PathBuf,
    /// Intrinsic rate table `r_number,k_int`.
    #[arg(long = "k-int")]
    pub k_int: PathBuf,
    /// YAML run configuration; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output directory for the guesses and the global fit.
    #[arg(long)]
    pub out: PathBuf,
    /// Overrides `global.epochs` of the configuration.
    #[arg(long)]
    pub epochs: Option<usize>,
}

/// Initial guess of every state followed by one joint global fit.
pub fn run(args: &PipelineArgs) -> Result<(), Box<dyn Error>> {
    let mut config = HdxConfig::load(args.config.as_deref())?;
    if let Some(epochs) = args.epochs {
        config.global.epochs = epochs;
    }
    config.global.check_device()?;
    let set = load_measurements(&args.data, &config)?;
    let rates = load_rates(&args.k_int)?;

    let guesses = fit_states(&set, &config.guess, &[])?;
    for guess in &guesses {
        write_text(
            &args.out.join(format!("guess_{}.csv", guess.state)),
            &guess.to_delimited()?,
        )?;
    }
    let temperatures: Vec<f64> = set.states().map(|m| m.temperature()).collect();
    let rates = [rates];
    let initial = DeltaGField::from_guesses(
        set.r_start(),
        set.r_end(),
        &guesses,
        &rates,
        &temperatures,
    )?;
    info!("global fit of {} state(s)", set.n_states());
    let result = fit_deltag_global_batch(&set, &rates, &initial, &config.global)?;
    write_result(&args.out, &config, &result)
}
