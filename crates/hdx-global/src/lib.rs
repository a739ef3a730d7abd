#![deny(missing_docs)]
#![doc = "Global regularized deltaG optimization: aligned tensors, the exchange forward model on candle tensors with autograd, AdamW/SGD epoch loop with early stopping, covariance estimates and result export."]

pub mod config;
/// Standard errors from the loss curvature.
pub mod covariance;
/// Patience-based early stopping.
pub mod early_stop;
mod export;
pub mod field;
pub mod forward;
pub mod inputs;
pub mod observer;
/// AdamW and momentum SGD step rules.
pub mod optim;
pub mod optimizer;
pub mod result;

pub use config::{Device, Dtype, GlobalFitConfig, OptimizerKind, RegularizerNorm};
pub use early_stop::{Checkpoint, EarlyStopping};
pub use field::DeltaGField;
pub use inputs::AlignedInputs;
pub use observer::{ChannelObserver, EpochProgress, FitObserver, NullObserver, ProgressEvent, StopHandle};
pub use optimizer::{fit_deltag_global, fit_deltag_global_batch, FitState, GlobalDeltaGOptimizer};
pub use result::{Convergence, FitResult, LossRecord, ResidueOutput, SquaredErrors, StopReason};
