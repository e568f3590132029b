//! Special functions for posterior comparison.
//!
//! Implements from first principles:
//! - Stirling series for ln(Gamma), and ln(Beta) without cancellation at large arguments
//! - The finite sum `h` giving P(X_b > X_a) for Beta variables with integral `alpha_b`
//! - Regularized incomplete beta function and Student's t CDF
//! - Log densities, composite Simpson and a graded Simpson rule for endpoint singularities
//!
//! Posteriors after a few thousand rounds carry parameters in the hundreds of
//! thousands, so everything is evaluated in log space. Gamma itself is never
//! formed.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

// ─── Log-gamma / log-beta ────────────────────────────────────────────

/// Below this, arguments are shifted up with Gamma(z + 1) = z Gamma(z)
/// before the asymptotic series is applied.
const STIRLING_MIN: f64 = 10.0;

/// ln(sqrt(2 pi))
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Tail of Stirling's series: ln Gamma(z) - [(z - 1/2) ln z - z + ln sqrt(2 pi)].
///
/// Five Bernoulli terms; for z >= 10 the truncation error is below 1e-14.
fn stirling_tail(z: f64) -> f64 {
    let r = 1.0 / z;
    let r2 = r * r;
    r * (1.0 / 12.0
        + r2 * (-1.0 / 360.0 + r2 * (1.0 / 1260.0 + r2 * (-1.0 / 1680.0 + r2 / 1188.0))))
}

/// ln(Gamma(x)) for x > 0 (NaN otherwise).
pub fn ln_gamma(x: f64) -> f64 {
    if x.is_nan() || x <= 0.0 {
        return f64::NAN;
    }
    let mut z = x;
    let mut shift = 1.0_f64;
    while z < STIRLING_MIN {
        shift *= z;
        z += 1.0;
    }
    (z - 0.5) * z.ln() - z + LN_SQRT_2PI + stirling_tail(z) - shift.ln()
}

/// ln Gamma(z) - ln Gamma(z + s) for z >= `STIRLING_MIN`, s > 0.
///
/// Written in terms of ln_1p(s / z) so the two huge log-gammas never meet.
fn ln_gamma_ratio(z: f64, s: f64) -> f64 {
    -(z - 0.5) * (s / z).ln_1p() - s * (z + s).ln() + s + stirling_tail(z) - stirling_tail(z + s)
}

/// ln B(x, y).
///
/// Posterior shapes reach the millions, where ln Gamma(x) + ln Gamma(y) -
/// ln Gamma(x + y) cancels away most of its digits. Large arguments go
/// through Stirling's series with the leading terms regrouped as logs of
/// ratios.
pub fn ln_beta(x: f64, y: f64) -> f64 {
    let (small, large) = if x <= y { (x, y) } else { (y, x) };
    if large < STIRLING_MIN {
        return ln_gamma(small) + ln_gamma(large) - ln_gamma(small + large);
    }
    if small < STIRLING_MIN {
        return ln_gamma(small) + ln_gamma_ratio(large, small);
    }
    let ratio = small / large;
    LN_SQRT_2PI - (small - 0.5) * (1.0 / ratio).ln_1p() - large * ratio.ln_1p() - 0.5 * large.ln()
        + stirling_tail(small)
        + stirling_tail(large)
        - stirling_tail(small + large)
}

// ─── Shape guard ─────────────────────────────────────────────────────

/// Whether a shape parameter admits the finite closed-form sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Positive integer shape: the sum has exactly this many terms.
    IntegralShape(u64),
    /// Anything else: only the numerical fallback applies.
    FractionalShape(f64),
}

impl Shape {
    /// Values within 1e-9 (relative) of a positive integer count as integral,
    /// which absorbs the rounding left by moment-fitted priors such as 70.000000001.
    pub fn classify(alpha: f64) -> Self {
        if !alpha.is_finite() || alpha < 0.5 || alpha > u64::MAX as f64 {
            return Shape::FractionalShape(alpha);
        }
        let rounded = alpha.round();
        if (alpha - rounded).abs() <= 1e-9 * rounded.max(1.0) {
            Shape::IntegralShape(rounded as u64)
        } else {
            Shape::FractionalShape(alpha)
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Shape::IntegralShape(_))
    }
}

// ─── Closed-form comparison sum ──────────────────────────────────────

/// P(X_b > X_a) for X_a ~ Beta(alpha_a, beta_a), X_b ~ Beta(alpha_b, beta_b):
///
/// ```text
/// h = Σ_{i=0}^{alpha_b-1} B(alpha_a+i, beta_a+beta_b)
///                         / ((beta_b+i) B(1+i, beta_b) B(alpha_a, beta_a))
/// ```
///
/// The first term comes from two `ln_beta` calls; each following term adds
/// the log of the exact ratio between consecutive terms, so the cost is one
/// `ln` and one `exp` per term. The term count (`alpha_b`) is the cost driver.
///
/// Fails with `UnsupportedShape` when `alpha_b` is not a positive integer.
pub fn h_sum(alpha_a: f64, beta_a: f64, alpha_b: f64, beta_b: f64) -> Result<f64, ModelError> {
    let terms = match Shape::classify(alpha_b) {
        Shape::IntegralShape(n) => n,
        Shape::FractionalShape(alpha) => return Err(ModelError::UnsupportedShape { alpha }),
    };

    let pooled_beta = beta_a + beta_b;
    // i = 0: (beta_b) B(1, beta_b) = 1, leaving B(alpha_a, pooled) / B(alpha_a, beta_a)
    let mut log_term = ln_beta(alpha_a, pooled_beta) - ln_beta(alpha_a, beta_a);

    let mut total = 0.0_f64;
    for i in 0..terms {
        let term = log_term.exp();
        if !term.is_finite() {
            return Err(ModelError::NumericInstability {
                context: "h_sum term",
                value: term,
            });
        }
        total += term;

        let fi = i as f64;
        let ratio = (alpha_a + fi) / (alpha_a + pooled_beta + fi) * (beta_b + fi) / (1.0 + fi);
        log_term += ratio.ln();
    }

    Ok(total)
}

// ─── Incomplete beta / Student t ─────────────────────────────────────

/// Continued-fraction part of I_x(a, b), evaluated with Lentz's method.
///
/// Coefficients alternate between d(2m) = m (b - m) x / ((a + 2m - 1)(a + 2m))
/// and d(2m+1) = -(a + m)(a + b + m) x / ((a + 2m)(a + 2m + 1)). Stops once a
/// full even/odd pair changes the value by less than 1e-14; the number of
/// pairs needed grows like sqrt(max(a, b)).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const FLOOR: f64 = 1e-30;
    let nonzero = |v: f64| if v.abs() < FLOOR { FLOOR } else { v };
    let max_pairs = 200 + (10.0 * a.max(b).sqrt()) as usize;

    let mut c = 1.0_f64;
    let mut d = 1.0 / nonzero(1.0 - (a + b) * x / (a + 1.0));
    let mut value = d;

    for m in 1..=max_pairs {
        let m = m as f64;
        let even = m * (b - m) * x / ((a + 2.0 * m - 1.0) * (a + 2.0 * m));
        let odd = -(a + m) * (a + b + m) * x / ((a + 2.0 * m) * (a + 2.0 * m + 1.0));

        let mut change = 1.0;
        for coefficient in [even, odd] {
            d = 1.0 / nonzero(1.0 + coefficient * d);
            c = nonzero(1.0 + coefficient / c);
            change = c * d;
            value *= change;
        }
        if (change - 1.0).abs() < 1e-14 {
            break;
        }
    }
    value
}

/// Regularized incomplete beta I_x(a, b): the Beta(a, b) CDF at `x`.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) {
        return f64::NAN;
    }
    if x == 0.0 || x == 1.0 {
        return x;
    }

    // The fraction converges quickly only left of (a + 1) / (a + b + 2);
    // on the right, evaluate the mirrored upper tail I_{1-x}(b, a).
    let upper = x > (a + 1.0) / (a + b + 2.0);
    let (p, q, t) = if upper { (b, a, 1.0 - x) } else { (a, b, x) };

    let ln_front = p * t.ln() + q * (-t).ln_1p() - ln_beta(p, q) - p.ln();
    let tail = (ln_front.exp() * beta_continued_fraction(p, q, t)).clamp(0.0, 1.0);
    if upper {
        1.0 - tail
    } else {
        tail
    }
}

/// Student's t CDF: P(T <= t) for `df` degrees of freedom.
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if df <= 0.0 || t.is_nan() {
        return f64::NAN;
    }
    // P(|T| > |t|) = I_{df / (df + t^2)}(df / 2, 1 / 2)
    let two_sided = regularized_incomplete_beta(df / 2.0, 0.5, df / (df + t * t));
    if t >= 0.0 {
        1.0 - 0.5 * two_sided
    } else {
        0.5 * two_sided
    }
}

// ─── Densities ───────────────────────────────────────────────────────

/// Log density of Beta(a, b) at `x` in (0, 1).
pub fn beta_ln_pdf(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 || x >= 1.0 {
        return f64::NEG_INFINITY;
    }
    (a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - ln_beta(a, b)
}

/// Log density of the standard Student t with `df` degrees of freedom.
pub fn t_ln_pdf(t: f64, df: f64) -> f64 {
    ln_gamma((df + 1.0) / 2.0)
        - ln_gamma(df / 2.0)
        - 0.5 * (df * std::f64::consts::PI).ln()
        - (df + 1.0) / 2.0 * (1.0 + t * t / df).ln()
}

/// E[(T - k)+] for a standard Student t with `df > 1`.
pub fn t_partial_expectation(k: f64, df: f64) -> f64 {
    (df + k * k) / (df - 1.0) * t_ln_pdf(k, df).exp() - k * (1.0 - t_cdf(k, df))
}

// ─── Quadrature ──────────────────────────────────────────────────────

/// Composite Simpson rule over `[lo, hi]` with `intervals` sub-intervals
/// (rounded up to even).
pub fn simpson<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, intervals: usize) -> f64 {
    let n = (intervals.max(2) + 1) & !1;
    let h = (hi - lo) / n as f64;
    let mut acc = f(lo) + f(hi);
    for i in 1..n {
        let x = lo + h * i as f64;
        acc += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    acc * h / 3.0
}

/// Integrand order reached at a graded endpoint after substitution.
const GRADED_ORDER: f64 = 5.0;

/// Simpson over the interval between `end` and `mid` (either orientation),
/// for an integrand that behaves like |y - end|^(order - 1) near `end`.
///
/// Substitutes y = end + (mid - end) t^q with q = max(1, 5 / order), which
/// turns an integrable endpoint singularity into a t^4 zero and keeps the
/// rule at full accuracy.
pub fn graded_simpson<F: Fn(f64) -> f64>(f: F, end: f64, mid: f64, order: f64, intervals: usize) -> f64 {
    let q = (GRADED_ORDER / order).max(1.0);
    let span = mid - end;
    let mapped = |t: f64| {
        if t == 0.0 {
            return 0.0;
        }
        f(end + span * t.powf(q)) * q * t.powf(q - 1.0)
    };
    simpson(mapped, 0.0, 1.0, intervals) * span.abs()
}
