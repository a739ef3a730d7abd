use std::error::Error;

use clap::{Parser, Subcommand};

use hdx_cli::commands::{
    global::{self, GlobalArgs},
    guess::{self, GuessArgs},
    pipeline::{self, PipelineArgs},
};

#[derive(Parser, Debug)]
#[command(name = "hdx-fit", about = "HDX-MS deltaG fitting")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-residue rate guesses from weighted-average uptake curves.
    Guess(GuessArgs),
    /// Regularized global deltaG fit from a given initial guess.
    Global(GlobalArgs),
    /// Initial guess followed by a joint global fit of every state.
    Pipeline(PipelineArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter(cli.verbose)))
        .format_timestamp_millis()
        .init();

    match cli.command {
        Command::Guess(args) => guess::run(&args),
        Command::Global(args) => global::run(&args),
        Command::Pipeline(args) => pipeline::run(&args),
    }
}
