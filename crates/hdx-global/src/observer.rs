//! Progress reporting and cooperative cancellation of the epoch loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::result::StopReason;

/// Snapshot sent to observers at checkpoint epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochProgress {
    /// 1-based epoch.
    pub epoch: usize,
    /// Loss of this epoch.
    pub loss: f64,
    /// Best loss so far.
    pub best_loss: f64,
    /// Largest gradient component.
    pub gradient_max_norm: f64,
}

/// Receives progress from the optimizer; must not block.
pub trait FitObserver {
    /// Called at every checkpoint epoch.
    fn on_epoch(&mut self, progress: &EpochProgress);

    /// Called once when the fit reaches a terminal state.
    fn on_finish(&mut self, _reason: StopReason) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl FitObserver for NullObserver {
    fn on_epoch(&mut self, _progress: &EpochProgress) {}
}

/// Message of a [`ChannelObserver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Checkpoint epoch.
    Epoch(EpochProgress),
    /// Terminal state.
    Finished(StopReason),
}

/// Forwards progress over an mpsc channel; send failures are dropped.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<ProgressEvent>,
}

impl ChannelObserver {
    /// Observer sending to `sender`.
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl FitObserver for ChannelObserver {
    fn on_epoch(&mut self, progress: &EpochProgress) {
        let _ = self.sender.send(ProgressEvent::Epoch(*progress));
    }

    fn on_finish(&mut self, reason: StopReason) {
        let _ = self.sender.send(ProgressEvent::Finished(reason));
    }
}

/// Shared flag asking a running fit to stop at the next epoch boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Handle with the flag lowered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
