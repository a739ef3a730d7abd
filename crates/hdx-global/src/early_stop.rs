/// Outcome of feeding one epoch's loss to [`EarlyStopping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// New best loss.
    Improved,
    /// No improvement; patience not yet used up.
    Waiting,
    /// Patience used up.
    Exhausted,
}

/// Patience-based stopping on the loss curve.
///
/// A loss counts as an improvement when it is below `best - min_delta`.
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyStopping {
    min_delta: f64,
    patience: usize,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
}

impl EarlyStopping {
    /// Fresh tracker.
    pub fn new(min_delta: f64, patience: usize) -> Self {
        Self {
            min_delta,
            patience,
            best: f64::INFINITY,
            best_epoch: None,
            wait: 0,
        }
    }

    /// Records the loss of `epoch`.
    pub fn update(&mut self, epoch: usize, loss: f64) -> Checkpoint {
        if loss < self.best - self.min_delta || (self.best_epoch.is_none() && loss.is_finite()) {
            self.best = loss;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return Checkpoint::Improved;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            Checkpoint::Exhausted
        } else {
            Checkpoint::Waiting
        }
    }

    /// Best loss so far.
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Epoch of the best loss.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Consecutive non-improving epochs.
    pub fn wait(&self) -> usize {
        self.wait
    }
}
