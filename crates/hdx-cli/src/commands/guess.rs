//! `hdx-fit guess`: first-stage rate fits written per state.

use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use log::info;

use hdx_core::HdxMeasurementSet;
use hdx_kinetics::{fit_rates_weighted_average, InitialGuessConfig, InitialGuessResult};

use super::{load_measurements, write_text};
use crate::config::HdxConfig;

/// Arguments of `hdx-fit guess`.
#[derive(Args, Debug)]
pub struct GuessArgs {
    /// Uniform peptide table (`state,exposure,start,end,sequence,uptake,uptake_sd`).
    #[arg(long)]
    pub data: PathBuf,
    /// YAML run configuration; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output directory receiving one `guess_<state>.csv` per state.
    #[arg(long)]
    pub out: PathBuf,
    /// Restrict the fit to these states.
    #[arg(long = "state", value_name = "NAME")]
    pub states: Vec<String>,
}

/// Fits per-residue rates for every selected state.
pub fn fit_states(
    set: &HdxMeasurementSet,
    config: &InitialGuessConfig,
    only: &[String],
) -> Result<Vec<InitialGuessResult>, Box<dyn Error>> {
    let mut results = Vec::new();
    for measurement in set.states() {
        if !only.is_empty() && !only.iter().any(|name| name == measurement.name()) {
            continue;
        }
        info!("initial guess of state {}", measurement.name());
        results.push(fit_rates_weighted_average(measurement, config)?);
    }
    if results.is_empty() {
        return Err(format!("none of the states {only:?} is present in the data").into());
    }
    Ok(results)
}

/// Runs `hdx-fit guess`.
pub fn run(args: &GuessArgs) -> Result<(), Box<dyn Error>> {
    let config = HdxConfig::load(args.config.as_deref())?;
    let set = load_measurements(&args.data, &config)?;
    for result in fit_states(&set, &config.guess, &args.states)? {
        write_text(
            &args.out.join(format!("guess_{}.csv", result.state)),
            &result.to_delimited()?,
        )?;
    }
    Ok(())
}
