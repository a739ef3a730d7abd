mod common;

use common::*;
use hdx_core::{HdxError, HdxMeasurementSet, IntrinsicRateTable};
use hdx_global::{fit_deltag_global, fit_deltag_global_batch, Device, DeltaGField, Dtype, GlobalFitConfig};

#[cfg(not(feature = "cuda"))]
#[test]
fn accelerator_is_rejected_before_inputs_are_read() {
    let config = GlobalFitConfig {
        device: Device::Accelerator,
        ..quick_config(10)
    };
    // rate table and initial guess do not match the measurement at all
    let rates = IntrinsicRateTable::from_slice(500, &[1.0; 3]).unwrap();
    let initial = DeltaGField::from_residues(500, vec![1.0; 3]).unwrap();
    let err = fit_deltag_global(&measurement("apo", 0.0), &rates, &initial, &config).unwrap_err();
    assert!(matches!(err, HdxError::Device(_)));
    assert_eq!(err.info().code, "device_unavailable");
    assert_eq!(err.info().context.get("device").map(String::as_str), Some("accelerator"));

    let err = fit_deltag_global_batch(&two_state_set(), &[], &initial, &config).unwrap_err();
    assert!(matches!(err, HdxError::Device(_)));
}

#[test]
fn single_precision_runs_in_f32_tensors() {
    let set = HdxMeasurementSet::from(measurement("apo", 0.0));
    let config = GlobalFitConfig {
        dtype: Dtype::Float32,
        ..quick_config(30)
    };
    let result = fit_deltag_global_batch(&set, &[k_int()], &flat_guess(), &config).unwrap();
    for &d in result.predicted() {
        assert_eq!(d, d as f32 as f64);
    }
    for &g in result.deltag_of("apo").unwrap() {
        assert!(g.is_finite());
    }
    assert_eq!(result.convergence().epochs_run, 30);
}

#[test]
fn invalid_settings_are_config_errors() {
    let apo = measurement("apo", 0.0);
    for config in [
        GlobalFitConfig { learning_rate: -1.0, ..quick_config(10) },
        GlobalFitConfig { learning_rate: 0.0, ..quick_config(10) },
        GlobalFitConfig { stop_patience: 0, ..quick_config(10) },
        GlobalFitConfig { r1: f64::NAN, ..quick_config(10) },
        GlobalFitConfig { epochs: 0, ..quick_config(10) },
        GlobalFitConfig { beta1: 1.0, ..quick_config(10) },
    ] {
        let err = fit_deltag_global(&apo, &k_int(), &flat_guess(), &config).unwrap_err();
        assert!(matches!(err, HdxError::Config(_)), "{err}");
    }
}
