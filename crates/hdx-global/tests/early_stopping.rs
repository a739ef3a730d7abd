mod common;

use std::sync::Arc;

use common::*;
use hdx_core::HdxMeasurementSet;
use hdx_global::{
    AlignedInputs, Checkpoint, EarlyStopping, FitState, GlobalDeltaGOptimizer, GlobalFitConfig,
    NullObserver, StopHandle, StopReason,
};

#[test]
fn improvement_needs_min_delta() {
    let mut early = EarlyStopping::new(0.1, 3);
    assert_eq!(early.update(1, 10.0), Checkpoint::Improved);
    assert_eq!(early.update(2, 9.95), Checkpoint::Waiting);
    assert_eq!(early.update(3, 9.5), Checkpoint::Improved);
    assert_eq!(early.best_epoch(), Some(3));
    assert_eq!(early.update(4, 9.45), Checkpoint::Waiting);
    assert_eq!(early.update(5, 9.41), Checkpoint::Waiting);
    assert_eq!(early.update(6, 9.40), Checkpoint::Exhausted);
    assert_eq!(early.best(), 9.5);
    assert_eq!(early.wait(), 3);
}

#[test]
fn plateau_after_epoch_ten_stops_after_patience() {
    let set = HdxMeasurementSet::from(measurement("apo", 0.0));
    let inputs = Arc::new(AlignedInputs::from_set(&set, &[k_int()]).unwrap());
    let patience = 7;
    let config = GlobalFitConfig {
        learning_rate: 0.01,
        stop_loss: 0.0,
        stop_patience: patience,
        ..quick_config(1_000)
    };
    let mut optimizer = GlobalDeltaGOptimizer::new(inputs, &flat_guess(), config).unwrap();
    let mut observer = NullObserver;
    for _ in 0..9 {
        assert_eq!(optimizer.step(&mut observer).unwrap(), FitState::Running);
    }
    // parameters evaluated at epoch 10 stay fixed from here on
    optimizer.set_learning_rate(0.0);
    let epoch_ten = optimizer.current_deltag().unwrap();

    let result = optimizer.run(&mut observer).unwrap();
    let convergence = result.convergence();
    assert_eq!(result.stop_reason(), StopReason::EarlyStopped);
    assert_eq!(convergence.best_epoch, Some(10));
    assert_eq!(convergence.epochs_run, 10 + patience);
    let losses = result.losses();
    assert!(losses[9].loss < losses[8].loss);
    assert!(losses[10..].iter().all(|l| l.loss == losses[9].loss));
    for (returned, expected) in result.deltag_of("apo").unwrap().iter().zip(&epoch_ten) {
        assert!((returned - expected).abs() < 1e-9, "{returned} vs {expected}");
    }
}

#[test]
fn best_weights_are_restored() {
    let apo = measurement("apo", 0.0);
    let set = HdxMeasurementSet::from(apo);
    let inputs = Arc::new(AlignedInputs::from_set(&set, &[k_int()]).unwrap());
    // large steps make the loss curve non-monotonic
    let config = GlobalFitConfig {
        learning_rate: 5.0,
        stop_loss: 0.0,
        stop_patience: 5,
        ..quick_config(1_000)
    };
    let mut optimizer = GlobalDeltaGOptimizer::new(inputs, &flat_guess(), config).unwrap();
    assert_eq!(optimizer.state(), FitState::Initialized);
    let mut observer = NullObserver;
    while optimizer.state().stop_reason().is_none() {
        optimizer.step(&mut observer).unwrap();
    }
    assert!(optimizer.step(&mut observer).is_err());
    let result = optimizer.into_result().unwrap();
    let convergence = result.convergence();
    let best_epoch = convergence.best_epoch.unwrap();
    let best = result.losses()[best_epoch - 1].loss;
    assert_eq!(best, convergence.best_loss);
    for record in result.losses() {
        assert!(record.loss >= best);
    }
    let errors = result.get_squared_errors();
    let data_loss = result.losses()[best_epoch - 1].data_loss;
    assert!((errors.total() - data_loss).abs() <= 1e-9 * data_loss.max(1.0));
}

#[test]
fn stop_handle_cancels_before_first_epoch() {
    let set = HdxMeasurementSet::from(measurement("apo", 0.0));
    let stop = StopHandle::new();
    let optimizer = GlobalDeltaGOptimizer::for_set(&set, &[k_int()], &flat_guess(), quick_config(100))
        .unwrap()
        .with_stop_handle(stop.clone());
    stop.request_stop();
    let result = optimizer.run(&mut NullObserver).unwrap();
    assert_eq!(result.stop_reason(), StopReason::Cancelled);
    assert_eq!(result.convergence().epochs_run, 0);
    assert!(result.losses().is_empty());
    assert_eq!(result.deltag_of("apo").unwrap(), flat_guess().values());
}

#[test]
fn overflowing_loss_is_reported_as_divergence() {
    let mut apo = measurement("apo", 0.0);
    apo.set_uptake(0, 3, 1e300).unwrap();
    let set = HdxMeasurementSet::from(apo);
    let result = GlobalDeltaGOptimizer::for_set(&set, &[k_int()], &flat_guess(), quick_config(100))
        .unwrap()
        .run(&mut NullObserver)
        .unwrap();
    assert_eq!(result.stop_reason(), StopReason::Diverged);
    assert_eq!(result.convergence().epochs_run, 1);
    assert!(result.losses().is_empty());
    assert_eq!(result.deltag_of("apo").unwrap(), flat_guess().values());
}
