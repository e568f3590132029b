//! Property tests for the statistical core.
//!
//! Uses proptest to verify:
//! 1. Moment fitting round-trips mean and variance
//! 2. Complement symmetry: P(B > A) + P(A > B) = 1, including posterior scale
//! 3. Identical posteriors compare at exactly one half
//! 4. Expected losses are never negative
//! 5. More evidence for A strictly lowers the loss of choosing A
//! 6. A trial is a pure function of its seed

use proptest::prelude::*;
use splitlab_core::{
    expected_loss, fit_beta, fit_gamma, probability_b_greater_a, run_trial, Beta, PriorSpec,
    SamplingDistribution, SimulationConfig, Variant, VariantPriors,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_integral_beta() -> impl Strategy<Value = Beta> {
    (1u32..200, 1.0..500.0_f64).prop_map(|(a, b)| Beta::new(a as f64, b).unwrap())
}

fn arb_rate() -> impl Strategy<Value = f64> {
    0.01..0.99_f64
}

// ── 1. Moment fitting ────────────────────────────────────────────────

proptest! {
    #[test]
    fn fit_beta_round_trip(mean in arb_rate(), frac in 0.01..0.99_f64) {
        let variance = frac * mean * (1.0 - mean);
        let b = fit_beta(mean, variance).unwrap();
        prop_assert!((b.mean() - mean).abs() < 1e-9 * mean.max(1e-3));
        prop_assert!((b.variance() - variance).abs() / variance < 1e-6);
    }

    #[test]
    fn fit_beta_rejects_impossible_variance(mean in arb_rate(), excess in 1.0..10.0_f64) {
        let variance = excess * mean * (1.0 - mean);
        prop_assert!(fit_beta(mean, variance).is_err());
    }

    #[test]
    fn fit_gamma_round_trip(mean in 0.01..100.0_f64, variance in 0.01..100.0_f64) {
        let g = fit_gamma(mean, variance).unwrap();
        prop_assert!((g.mean() - mean).abs() / mean < 1e-9);
        prop_assert!((g.variance() - variance).abs() / variance < 1e-9);
    }
}

// ── 2–4. Comparison probability and loss ─────────────────────────────

proptest! {
    #[test]
    fn complement_symmetry(a in arb_integral_beta(), b in arb_integral_beta()) {
        let p_ba = probability_b_greater_a(&a, &b).unwrap();
        let p_ab = probability_b_greater_a(&b, &a).unwrap();
        prop_assert!((p_ba + p_ab - 1.0).abs() < 1e-8, "{} + {}", p_ba, p_ab);
        prop_assert!((0.0..=1.0).contains(&p_ba));
    }

    #[test]
    fn identical_posteriors_are_even(a in arb_integral_beta()) {
        let p = probability_b_greater_a(&a, &a).unwrap();
        prop_assert!((p - 0.5).abs() < 1e-8, "{}", p);
    }

    #[test]
    fn losses_are_non_negative(a in arb_integral_beta(), b in arb_integral_beta()) {
        prop_assert!(expected_loss(Variant::A, &a, &b).unwrap() >= 0.0);
        prop_assert!(expected_loss(Variant::B, &a, &b).unwrap() >= 0.0);
    }
}

// Posteriors after millions of observations at a ~1% rate.
fn arb_posterior_pair() -> impl Strategy<Value = (Beta, Beta)> {
    (10_000u32..40_000, -300i32..300, 1.0e6..4.0e6_f64, -5.0e4..5.0e4_f64).prop_map(
        |(alpha, d_alpha, beta, d_beta)| {
            let a = Beta::new(alpha as f64, beta).unwrap();
            let b = Beta::new((alpha as i32 + d_alpha) as f64, beta + d_beta).unwrap();
            (a, b)
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // Summation drift at this scale stays near 1e-10; 1e-9 leaves headroom.
    #[test]
    fn complement_symmetry_at_posterior_scale((a, b) in arb_posterior_pair()) {
        let p_ba = probability_b_greater_a(&a, &b).unwrap();
        let p_ab = probability_b_greater_a(&b, &a).unwrap();
        prop_assert!((p_ba + p_ab - 1.0).abs() < 1e-9, "{} + {}", p_ba, p_ab);
        prop_assert!((0.0..=1.0).contains(&p_ba));
    }
}

// ── 5. Monotonicity ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn more_evidence_for_a_lowers_loss_of_a(
        alpha_a in 1u32..30,
        alpha_b in 1u32..30,
        beta_shared in 10.0..40.0_f64,
    ) {
        let b = Beta::new(alpha_b as f64, beta_shared).unwrap();
        let before = Beta::new(alpha_a as f64, beta_shared).unwrap();
        let after = Beta::new(alpha_a as f64 + 1.0, beta_shared).unwrap();

        let loss_before = expected_loss(Variant::A, &before, &b).unwrap();
        let loss_after = expected_loss(Variant::A, &after, &b).unwrap();
        prop_assume!(loss_before > 1e-10);
        prop_assert!(loss_after < loss_before, "{} !< {}", loss_after, loss_before);
    }
}

// ── 6. Determinism ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn trial_is_pure_in_its_seed(seed in any::<u64>(), rate_a in 0.05..0.3_f64, rate_b in 0.05..0.3_f64) {
        let config = SimulationConfig {
            num_trials: 1,
            loss_threshold: 2e-3,
            sampling_distribution: SamplingDistribution::FixedBernoulli { rate_a, rate_b },
            obs_per_round: 100,
            max_rounds: 40,
            ..SimulationConfig::default()
        };
        let priors = VariantPriors::shared(PriorSpec::Beta(Beta::new(1.0, 1.0).unwrap()));

        let r1 = run_trial(&config, &priors, seed).unwrap();
        let r2 = run_trial(&config, &priors, seed).unwrap();
        prop_assert_eq!(&r1, &r2);
        prop_assert!(r1.rounds_run <= config.max_rounds);
        if !r1.stopped {
            prop_assert_eq!(r1.declared_winner, None);
        }
    }
}
