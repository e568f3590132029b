//! Posterior comparison: P(B > A) and the expected loss of choosing each variant.
//!
//! Beta posteriors use the closed-form sum from `special::h_sum`. That sum only
//! exists for integral shapes; the numerical integral is a separate, explicitly
//! selected method (`EvaluationMethod::NumericalIntegration`) and is never
//! substituted automatically.
//!
//! Normal-Gamma posteriors compare the Student-t marginals of the two means by
//! one-dimensional quadrature.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::distributions::{Beta, NormalGamma, PriorSpec, Variant};
use crate::error::ModelError;
use crate::special::{
    beta_ln_pdf, graded_simpson, h_sum, regularized_incomplete_beta, simpson, t_cdf, t_ln_pdf,
    t_partial_expectation,
};

/// Losses below this are clamped to zero with a warning; anything between it
/// and zero is rounding noise and is clamped silently.
pub const NEGATIVE_LOSS_TOLERANCE: f64 = 1e-9;

const QUADRATURE_INTERVALS: usize = 4000;

/// How Beta posteriors are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    /// Finite sum; requires integral `alpha` on both posteriors.
    #[default]
    ClosedForm,
    /// Quadrature over the joint density; works for any shape, much slower.
    NumericalIntegration,
}

/// Expected loss of choosing each variant at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossPair {
    pub loss_a: f64,
    pub loss_b: f64,
}

impl LossPair {
    pub fn get(&self, variant: Variant) -> f64 {
        match variant {
            Variant::A => self.loss_a,
            Variant::B => self.loss_b,
        }
    }

    /// Smaller of the two losses, i.e. the loss of the best available choice.
    pub fn min(&self) -> f64 {
        self.loss_a.min(self.loss_b)
    }

    /// The variant with the smaller loss; ties go to A.
    pub fn preferred(&self) -> Variant {
        if self.loss_a <= self.loss_b {
            Variant::A
        } else {
            Variant::B
        }
    }
}

fn clamp_loss(raw: f64, variant: Variant) -> f64 {
    if raw < -NEGATIVE_LOSS_TOLERANCE {
        warn!(
            ?variant,
            loss = raw,
            tolerance = NEGATIVE_LOSS_TOLERANCE,
            "numeric instability: negative expected loss clamped to zero"
        );
        0.0
    } else {
        raw.max(0.0)
    }
}

// ─── Beta: closed form ───────────────────────────────────────────────

/// P(X_b > X_a) for Beta posteriors. Requires integral `b.alpha`.
pub fn probability_b_greater_a(a: &Beta, b: &Beta) -> Result<f64, ModelError> {
    let h = h_sum(a.alpha(), a.beta(), b.alpha(), b.beta())?;
    Ok(h.clamp(0.0, 1.0))
}

/// E[max(X_first - X_second, 0)]: what is lost by choosing `second`.
///
/// Uses B(alpha+1, beta) / B(alpha, beta) = alpha / (alpha + beta), so the only
/// special-function work is the two sums.
fn loss_of_choosing(first: &Beta, second: &Beta) -> Result<f64, ModelError> {
    let h_first_shifted = h_sum(first.alpha() + 1.0, first.beta(), second.alpha(), second.beta())?;
    let h_second_shifted = h_sum(first.alpha(), first.beta(), second.alpha() + 1.0, second.beta())?;
    Ok(first.mean() * (1.0 - h_first_shifted) - second.mean() * (1.0 - h_second_shifted))
}

/// Expected loss of declaring `variant` the winner, in closed form.
///
/// Both posteriors need an integral `alpha` (the formula for A swaps the roles
/// of `a` and `b`). Never negative.
pub fn expected_loss(variant: Variant, a: &Beta, b: &Beta) -> Result<f64, ModelError> {
    let raw = match variant {
        Variant::B => loss_of_choosing(a, b)?,
        Variant::A => loss_of_choosing(b, a)?,
    };
    Ok(clamp_loss(raw, variant))
}

// ─── Beta: numerical fallback ────────────────────────────────────────

fn beta_window(d: &Beta) -> (f64, f64) {
    let half = 12.0 * d.std_dev();
    ((d.mean() - half).max(0.0), (d.mean() + half).min(1.0))
}

/// Integrate `integrand` against the support of `d`, split at its mean.
///
/// A side of the window that reaches 0 or 1 may carry a Beta density
/// singularity (shape below 1), so it is integrated through `graded_simpson`
/// with the integrand's order at that end: `order_at_zero` / `order_at_one`.
fn beta_quadrature<F: Fn(f64) -> f64>(d: &Beta, integrand: F, order_at_zero: f64, order_at_one: f64) -> f64 {
    let (lo, hi) = beta_window(d);
    let mid = d.mean();
    let half = QUADRATURE_INTERVALS / 2;
    let left = if lo == 0.0 {
        graded_simpson(&integrand, 0.0, mid, order_at_zero, half)
    } else {
        simpson(&integrand, lo, mid, half)
    };
    let right = if hi == 1.0 {
        graded_simpson(&integrand, 1.0, mid, order_at_one, half)
    } else {
        simpson(&integrand, mid, hi, half)
    };
    left + right
}

/// P(X_b > X_a) = ∫ f_b(y) I_y(alpha_a, beta_a) dy, any shape.
pub fn probability_b_greater_a_numeric(a: &Beta, b: &Beta) -> f64 {
    let p = beta_quadrature(
        b,
        |y| beta_ln_pdf(y, b.alpha(), b.beta()).exp() * regularized_incomplete_beta(a.alpha(), a.beta(), y),
        a.alpha() + b.alpha(),
        b.beta(),
    );
    p.clamp(0.0, 1.0)
}

/// E[(X_first - y)+] for X_first ~ Beta, as a function of the threshold y.
fn beta_partial_expectation(first: &Beta, y: f64) -> f64 {
    let upper_shifted = 1.0 - regularized_incomplete_beta(first.alpha() + 1.0, first.beta(), y);
    let upper = 1.0 - regularized_incomplete_beta(first.alpha(), first.beta(), y);
    first.mean() * upper_shifted - y * upper
}

fn loss_of_choosing_numeric(first: &Beta, second: &Beta) -> f64 {
    beta_quadrature(
        second,
        |y| beta_ln_pdf(y, second.alpha(), second.beta()).exp() * beta_partial_expectation(first, y),
        second.alpha(),
        second.beta(),
    )
}

/// Expected loss of declaring `variant` the winner, by quadrature. Any shape.
pub fn expected_loss_numeric(variant: Variant, a: &Beta, b: &Beta) -> f64 {
    let raw = match variant {
        Variant::B => loss_of_choosing_numeric(a, b),
        Variant::A => loss_of_choosing_numeric(b, a),
    };
    clamp_loss(raw, variant)
}

// ─── Normal-Gamma ────────────────────────────────────────────────────

/// Location-scale Student t: the marginal posterior of a Gaussian mean.
#[derive(Debug, Clone, Copy)]
struct MeanMarginal {
    loc: f64,
    scale: f64,
    dof: f64,
}

impl MeanMarginal {
    fn of(d: &NormalGamma) -> Self {
        Self {
            loc: d.mu0(),
            scale: d.mean_scale(),
            dof: d.mean_dof(),
        }
    }

    fn pdf(&self, x: f64) -> f64 {
        t_ln_pdf((x - self.loc) / self.scale, self.dof).exp() / self.scale
    }

    fn cdf(&self, x: f64) -> f64 {
        t_cdf((x - self.loc) / self.scale, self.dof)
    }

    /// E[(X - y)+]
    fn partial_expectation(&self, y: f64) -> f64 {
        self.scale * t_partial_expectation((y - self.loc) / self.scale, self.dof)
    }

    /// Heavier tails need a wider window.
    fn window(&self) -> (f64, f64) {
        let k = if self.dof > 30.0 { 12.0 } else { 60.0 };
        (self.loc - k * self.scale, self.loc + k * self.scale)
    }
}

fn require_finite_mean(d: &NormalGamma) -> Result<(), ModelError> {
    if d.alpha() <= 0.5 {
        Err(ModelError::UndefinedExpectation { alpha: d.alpha() })
    } else {
        Ok(())
    }
}

/// P(mu_b > mu_a) for Normal-Gamma posteriors.
pub fn normal_gamma_probability_b_greater_a(a: &NormalGamma, b: &NormalGamma) -> f64 {
    let ma = MeanMarginal::of(a);
    let mb = MeanMarginal::of(b);
    let (lo, hi) = mb.window();
    simpson(|y| mb.pdf(y) * ma.cdf(y), lo, hi, QUADRATURE_INTERVALS).clamp(0.0, 1.0)
}

/// Expected loss of declaring `variant` the winner for Normal-Gamma posteriors.
///
/// Needs `alpha > 0.5` on both sides so the Student-t means exist.
pub fn normal_gamma_expected_loss(
    variant: Variant,
    a: &NormalGamma,
    b: &NormalGamma,
) -> Result<f64, ModelError> {
    require_finite_mean(a)?;
    require_finite_mean(b)?;

    let (first, second) = match variant {
        Variant::B => (MeanMarginal::of(a), MeanMarginal::of(b)),
        Variant::A => (MeanMarginal::of(b), MeanMarginal::of(a)),
    };
    let (lo, hi) = second.window();
    let raw = simpson(
        |y| second.pdf(y) * first.partial_expectation(y),
        lo,
        hi,
        QUADRATURE_INTERVALS,
    );
    Ok(clamp_loss(raw, variant))
}

// ─── Dispatch ────────────────────────────────────────────────────────

/// Expected losses of both variants for a pair of posteriors of the same family.
pub fn evaluate_losses(
    method: EvaluationMethod,
    a: &PriorSpec,
    b: &PriorSpec,
) -> Result<LossPair, ModelError> {
    match (a, b) {
        (PriorSpec::Beta(a), PriorSpec::Beta(b)) => match method {
            EvaluationMethod::ClosedForm => Ok(LossPair {
                loss_a: expected_loss(Variant::A, a, b)?,
                loss_b: expected_loss(Variant::B, a, b)?,
            }),
            EvaluationMethod::NumericalIntegration => Ok(LossPair {
                loss_a: expected_loss_numeric(Variant::A, a, b),
                loss_b: expected_loss_numeric(Variant::B, a, b),
            }),
        },
        (PriorSpec::NormalGamma(a), PriorSpec::NormalGamma(b)) => Ok(LossPair {
            loss_a: normal_gamma_expected_loss(Variant::A, a, b)?,
            loss_b: normal_gamma_expected_loss(Variant::B, a, b)?,
        }),
        (PriorSpec::Gamma(_), PriorSpec::Gamma(_)) => Err(ModelError::InvalidConfig(
            "Gamma posteriors have no loss evaluator".into(),
        )),
        _ => Err(ModelError::FamilyMismatch {
            a: a.family(),
            b: b.family(),
        }),
    }
}

/// P(B > A) for a pair of posteriors of the same family.
pub fn evaluate_probability(
    method: EvaluationMethod,
    a: &PriorSpec,
    b: &PriorSpec,
) -> Result<f64, ModelError> {
    match (a, b) {
        (PriorSpec::Beta(a), PriorSpec::Beta(b)) => match method {
            EvaluationMethod::ClosedForm => probability_b_greater_a(a, b),
            EvaluationMethod::NumericalIntegration => Ok(probability_b_greater_a_numeric(a, b)),
        },
        (PriorSpec::NormalGamma(a), PriorSpec::NormalGamma(b)) => {
            Ok(normal_gamma_probability_b_greater_a(a, b))
        }
        _ => Err(ModelError::FamilyMismatch {
            a: a.family(),
            b: b.family(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn beta(a: f64, b: f64) -> Beta {
        Beta::new(a, b).unwrap()
    }

    #[test]
    fn identical_posteriors_are_a_coin_flip() {
        let a = beta(70.0, 7000.0);
        let p = probability_b_greater_a(&a, &a).unwrap();
        assert!((p - 0.5).abs() < 1e-6, "{p}");
    }

    #[test]
    fn complement_symmetry() {
        let a = beta(12.0, 40.0);
        let b = beta(15.0, 35.0);
        let p_ba = probability_b_greater_a(&a, &b).unwrap();
        let p_ab = probability_b_greater_a(&b, &a).unwrap();
        assert!((p_ba + p_ab - 1.0).abs() < 1e-9, "{p_ba} + {p_ab}");
        assert!(p_ba > 0.5);
    }

    #[test]
    fn losses_are_non_negative_and_ordered() {
        let a = beta(10.0, 90.0);
        let b = beta(20.0, 80.0);
        let loss_a = expected_loss(Variant::A, &a, &b).unwrap();
        let loss_b = expected_loss(Variant::B, &a, &b).unwrap();
        assert!(loss_a >= 0.0 && loss_b >= 0.0);
        // B is clearly better: choosing A costs more
        assert!(loss_a > loss_b, "{loss_a} vs {loss_b}");
    }

    #[test]
    fn loss_difference_equals_mean_difference() {
        // E[(a-b)+] - E[(b-a)+] = E[a] - E[b]
        let a = beta(30.0, 70.0);
        let b = beta(25.0, 60.0);
        let loss_a = expected_loss(Variant::A, &a, &b).unwrap();
        let loss_b = expected_loss(Variant::B, &a, &b).unwrap();
        assert!(((loss_b - loss_a) - (a.mean() - b.mean())).abs() < 1e-9);
    }

    #[test]
    fn closed_form_rejects_fractional_shapes() {
        let a = beta(2.5, 3.0);
        let b = beta(3.0, 3.0);
        assert!(matches!(
            expected_loss(Variant::A, &a, &b),
            Err(ModelError::UnsupportedShape { .. })
        ));
        assert!(matches!(
            probability_b_greater_a(&b, &a),
            Err(ModelError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn numerical_matches_closed_form() {
        let a = beta(20.0, 80.0);
        let b = beta(25.0, 75.0);
        let p_closed = probability_b_greater_a(&a, &b).unwrap();
        let p_numeric = probability_b_greater_a_numeric(&a, &b);
        assert!((p_closed - p_numeric).abs() < 1e-6, "{p_closed} vs {p_numeric}");

        for variant in [Variant::A, Variant::B] {
            let closed = expected_loss(variant, &a, &b).unwrap();
            let numeric = expected_loss_numeric(variant, &a, &b);
            assert!((closed - numeric).abs() < 1e-6, "{variant:?}: {closed} vs {numeric}");
        }
    }

    #[test]
    fn numerical_handles_fractional_shapes() {
        let a = beta(2.5, 7.5);
        let p = probability_b_greater_a_numeric(&a, &a);
        assert!((p - 0.5).abs() < 1e-3, "{p}");
    }

    #[test]
    fn numerical_handles_shapes_below_one() {
        // U-shaped A: its density is unbounded at both ends of [0, 1]
        let a = beta(0.5, 0.5);
        let b = beta(2.5, 1.0);

        let p_ba = probability_b_greater_a_numeric(&a, &b);
        let p_ab = probability_b_greater_a_numeric(&b, &a);
        assert!((p_ba + p_ab - 1.0).abs() < 1e-6, "{p_ba} + {p_ab}");

        let same = probability_b_greater_a_numeric(&a, &a);
        assert!((same - 0.5).abs() < 1e-6, "{same}");

        let loss_a = expected_loss_numeric(Variant::A, &a, &b);
        let loss_b = expected_loss_numeric(Variant::B, &a, &b);
        assert!(((loss_b - loss_a) - (a.mean() - b.mean())).abs() < 1e-6, "{loss_a} {loss_b}");
    }

    #[test]
    fn numerical_handles_mixed_small_shapes() {
        let a = beta(0.3, 2.0);
        let b = beta(0.7, 0.4);
        let p_ba = probability_b_greater_a_numeric(&a, &b);
        let p_ab = probability_b_greater_a_numeric(&b, &a);
        assert!((p_ba + p_ab - 1.0).abs() < 1e-6, "{p_ba} + {p_ab}");
    }

    #[test]
    fn clamp_repairs_negative_loss() {
        assert_eq!(clamp_loss(-1e-6, Variant::A), 0.0);
        assert_eq!(clamp_loss(-1e-12, Variant::B), 0.0);
        assert_eq!(clamp_loss(2e-4, Variant::B), 2e-4);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Everything logged on this thread while `f` runs.
    fn logs_during(f: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn clamp_warns_beyond_tolerance() {
        let logs = logs_during(|| assert_eq!(clamp_loss(-1e-6, Variant::A), 0.0));
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("negative expected loss clamped to zero"), "{logs}");
    }

    #[test]
    fn clamp_is_silent_inside_tolerance() {
        let logs = logs_during(|| {
            assert_eq!(clamp_loss(-5e-10, Variant::B), 0.0);
            assert_eq!(clamp_loss(-NEGATIVE_LOSS_TOLERANCE, Variant::A), 0.0);
            assert_eq!(clamp_loss(3e-5, Variant::A), 3e-5);
        });
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn normal_gamma_symmetry() {
        let a = NormalGamma::new(1.0, 50.0, 20.0, 20.0).unwrap();
        let b = NormalGamma::new(1.2, 40.0, 15.0, 18.0).unwrap();
        let p_ba = normal_gamma_probability_b_greater_a(&a, &b);
        let p_ab = normal_gamma_probability_b_greater_a(&b, &a);
        assert!((p_ba + p_ab - 1.0).abs() < 1e-6, "{p_ba} + {p_ab}");
        assert!(p_ba > 0.5);
        let same = normal_gamma_probability_b_greater_a(&a, &a);
        assert!((same - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normal_gamma_loss_difference_equals_mean_difference() {
        let a = NormalGamma::new(1.0, 50.0, 20.0, 20.0).unwrap();
        let b = NormalGamma::new(1.2, 40.0, 15.0, 18.0).unwrap();
        let loss_a = normal_gamma_expected_loss(Variant::A, &a, &b).unwrap();
        let loss_b = normal_gamma_expected_loss(Variant::B, &a, &b).unwrap();
        assert!(loss_a > loss_b);
        assert!(((loss_a - loss_b) - (b.mu0() - a.mu0())).abs() < 1e-5);
    }

    #[test]
    fn normal_gamma_loss_needs_finite_mean() {
        let a = NormalGamma::new(0.0, 1.0, 0.4, 1.0).unwrap();
        let b = NormalGamma::new(0.0, 1.0, 3.0, 1.0).unwrap();
        assert!(matches!(
            normal_gamma_expected_loss(Variant::A, &a, &b),
            Err(ModelError::UndefinedExpectation { .. })
        ));
    }

    #[test]
    fn dispatch_rejects_mixed_families() {
        let a = PriorSpec::Beta(beta(2.0, 3.0));
        let b = PriorSpec::NormalGamma(NormalGamma::new(0.0, 1.0, 2.0, 1.0).unwrap());
        assert!(matches!(
            evaluate_losses(EvaluationMethod::ClosedForm, &a, &b),
            Err(ModelError::FamilyMismatch { .. })
        ));
    }

    #[test]
    fn loss_pair_preference_ties_go_to_a() {
        let tie = LossPair {
            loss_a: 1e-4,
            loss_b: 1e-4,
        };
        assert_eq!(tie.preferred(), Variant::A);
        assert_eq!(tie.min(), 1e-4);
    }
}
