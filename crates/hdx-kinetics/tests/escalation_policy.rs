use hdx_kinetics::{
    AmplitudeBound, EscalationPolicy, EscalationReason, FitStrategy, InitialGuessConfig,
    PeptideFit,
};

fn fit(r: f64, tau1: f64, tau2: f64, chi_squared: f64) -> PeptideFit {
    PeptideFit {
        rate: 1.0 / (r * tau1 + (1.0 - r) * tau2),
        tau1,
        tau2,
        r,
        chi_squared,
        strategy: FitStrategy::Local,
    }
}

#[test]
fn exact_amplitude_edges_depend_on_bound_mode() {
    let inclusive = EscalationPolicy::default();
    assert_eq!(inclusive.amplitude_bound, AmplitudeBound::Inclusive);
    assert_eq!(inclusive.should_escalate(&fit(0.0, 1.0, 10.0, 1.0)), None);
    assert_eq!(inclusive.should_escalate(&fit(1.0, 1.0, 10.0, 1.0)), None);

    let exclusive = EscalationPolicy {
        amplitude_bound: AmplitudeBound::Exclusive,
        ..EscalationPolicy::default()
    };
    assert_eq!(
        exclusive.should_escalate(&fit(1.0, 1.0, 10.0, 1.0)),
        Some(EscalationReason::AmplitudeOutOfBounds)
    );
    assert_eq!(exclusive.should_escalate(&fit(0.4, 1.0, 10.0, 1.0)), None);
}

#[test]
fn lifetime_and_residual_rules() {
    let policy = EscalationPolicy::default();
    assert_eq!(
        policy.should_escalate(&fit(0.5, f64::INFINITY, 10.0, 1.0)),
        Some(EscalationReason::NonFiniteTime)
    );
    assert_eq!(
        policy.should_escalate(&fit(0.5, 1.0, 10.0, 20.5)),
        Some(EscalationReason::ChiSquaredAboveThreshold)
    );
    assert_eq!(
        policy.should_escalate(&fit(0.5, 1.0, 10.0, f64::NAN)),
        Some(EscalationReason::ChiSquaredAboveThreshold)
    );
    assert_eq!(policy.should_escalate(&fit(0.5, 1.0, 10.0, 20.0)), None);
}

#[test]
fn config_defaults_from_empty_document() {
    let config: InitialGuessConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, InitialGuessConfig::default());
    assert_eq!(config.escalation.chi_squared_threshold, 20.0);
    assert_eq!(config.seed, 43);
    assert!(config.parallel);

    let custom: InitialGuessConfig = serde_json::from_str(
        r#"{"method": "half-time", "chi_squared_threshold": 5.0, "amplitude_bound": "exclusive"}"#,
    )
    .unwrap();
    assert_eq!(custom.escalation.chi_squared_threshold, 5.0);
    assert_eq!(custom.escalation.amplitude_bound, AmplitudeBound::Exclusive);
}
