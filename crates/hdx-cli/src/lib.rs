#![deny(missing_docs)]
#![doc = "Library side of the `hdx-fit` binary: run configuration and the guess, global and pipeline commands."]

pub mod commands;
pub mod config;

pub use config::HdxConfig;
