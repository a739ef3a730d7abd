use hdx_kinetics::{
    fit_peptide_uptake, half_time, initial_guess, EscalationPolicy, FitStrategy, PeptideFit,
};
use proptest::prelude::*;

fn assert_sentinel(fit: &PeptideFit) {
    assert_eq!(fit.strategy, FitStrategy::Skipped);
    assert!(fit.is_sentinel());
    assert!(fit.rate.is_nan());
    assert!(fit.tau1.is_nan());
    assert!(fit.tau2.is_nan());
    assert!(fit.r.is_nan());
    assert!(fit.chi_squared.is_nan());
}

proptest! {
    #[test]
    fn any_nan_yields_sentinel(
        values in prop::collection::vec(0.0f64..100.0, 3..12),
        slot in any::<prop::sample::Index>(),
    ) {
        let times: Vec<f64> = (0..values.len()).map(|i| i as f64 * 2.0).collect();
        let mut uptake = values.clone();
        let hole = slot.index(uptake.len());
        uptake[hole] = f64::NAN;

        let fit = fit_peptide_uptake(&times, &uptake, &EscalationPolicy::default());
        assert_sentinel(&fit);
        prop_assert!(half_time(&times, &uptake).is_nan());
        let (tau1, tau2) = initial_guess(&times, &uptake);
        prop_assert!(tau1.is_nan() && tau2.is_nan());
    }

    #[test]
    fn increasing_curves_bootstrap_to_finite_lifetimes(
        steps in prop::collection::vec(0.1f64..20.0, 4..10),
    ) {
        let times: Vec<f64> = (0..=steps.len()).map(|i| (i as f64 + 1.0) * 3.0).collect();
        let mut uptake = vec![1.0];
        for step in &steps {
            let next = (uptake[uptake.len() - 1] + step).min(99.0);
            uptake.push(next);
        }
        let (tau1, tau2) = initial_guess(&times, &uptake);
        prop_assert!(tau1.is_finite() && tau1 > 0.0);
        prop_assert!(tau2.is_finite() && tau2 > 0.0);
    }
}

#[test]
fn short_curves_have_no_bootstrap() {
    let (tau1, tau2) = initial_guess(&[1.0, 2.0], &[10.0, 20.0]);
    assert!(tau1.is_nan() && tau2.is_nan());

    let (tau1, tau2) = initial_guess(&[0.0, 0.0, 0.0, 1.0], &[0.0, 0.0, 0.0, 10.0]);
    assert!(tau1.is_nan() && tau2.is_nan());
}

#[test]
fn mismatched_lengths_are_skipped() {
    let fit = fit_peptide_uptake(&[0.0, 1.0, 2.0], &[0.0, 50.0], &EscalationPolicy::default());
    assert_sentinel(&fit);
}
