mod common;

use std::sync::mpsc;

use common::*;
use hdx_core::HdxMeasurementSet;
use hdx_global::{
    fit_deltag_global_batch, ChannelObserver, GlobalDeltaGOptimizer, GlobalFitConfig,
    ProgressEvent, StopReason,
};

#[test]
fn delimited_export_has_header_and_one_row_per_residue() {
    let set = two_state_set();
    let result = fit_deltag_global_batch(&set, &[k_int()], &flat_guess(), &quick_config(25)).unwrap();
    let text = result.to_delimited().unwrap();
    let header: Vec<&str> = text.lines().take_while(|l| l.starts_with("# ")).collect();
    assert_eq!(header[0], "# states: apo;bound");
    assert_eq!(header[1], "# r_start: 1");
    assert_eq!(header[2], "# r_end: 12");
    assert_eq!(header[3], "# stop_reason: epoch_limit_reached");
    assert_eq!(header[4], "# epochs_run: 25");
    assert!(header.iter().any(|l| *l == format!("# hash: {}", result.hash())));

    let rows: Vec<&str> = text.lines().skip(header.len()).collect();
    assert_eq!(rows[0], "state,r_number,dG,k_obs,covariance");
    assert_eq!(rows.len(), 1 + 2 * N_RESIDUES);
    assert!(rows[1].starts_with("apo,1,"));
    assert!(rows[1 + N_RESIDUES].starts_with("bound,1,"));
    // covariance disabled
    assert!(rows[1].ends_with(",NaN"));

    let losses = result.losses_to_delimited().unwrap();
    let mut lines = losses.lines();
    assert_eq!(lines.next(), Some("epoch,loss,data_loss,reg1,reg2"));
    assert_eq!(lines.count(), result.convergence().epochs_run);
}

#[test]
fn canonical_json_is_stable() {
    let set = HdxMeasurementSet::from(measurement("apo", 0.0));
    let result = fit_deltag_global_batch(&set, &[k_int()], &flat_guess(), &quick_config(10)).unwrap();
    let bytes = result.to_canonical_json().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["states"][0], "apo");
    assert_eq!(value["convergence"]["stop_reason"], "epoch_limit_reached");
    assert_eq!(value["deltag"].as_array().unwrap().len(), N_RESIDUES);
    assert_eq!(bytes, result.to_canonical_json().unwrap());
}

#[test]
fn channel_observer_receives_checkpoints() {
    let set = HdxMeasurementSet::from(measurement("apo", 0.0));
    let config = GlobalFitConfig {
        log_interval: 2,
        ..quick_config(9)
    };
    let (sender, receiver) = mpsc::channel();
    let mut observer = ChannelObserver::new(sender);
    let result = GlobalDeltaGOptimizer::for_set(&set, &[k_int()], &flat_guess(), config)
        .unwrap()
        .run(&mut observer)
        .unwrap();
    drop(observer);

    let events: Vec<ProgressEvent> = receiver.iter().collect();
    let epochs: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Epoch(progress) => Some(progress.epoch),
            ProgressEvent::Finished(_) => None,
        })
        .collect();
    assert_eq!(epochs, vec![2, 4, 6, 8]);
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Finished(StopReason::EpochLimitReached))
    );
    assert_eq!(result.stop_reason(), StopReason::EpochLimitReached);
}
