use rand::Rng;
use rand_distr::Distribution;
use rug::Float;
use rug::ops::Pow;

use crate::PRECISION_BITS;

/// 3-parameter Weibull distribution: shape (alpha), scale (lambda), location (theta).
#[derive(Clone, Copy, Debug)]
pub struct Weibull {
    pub shape: f64,
    pub scale: f64,
    pub location: f64,
}

impl Weibull {
    pub fn new(shape: f64, scale: f64, location: f64) -> Self {
        Self {
            shape,
            scale,
            location,
        }
    }

    fn prec(x: f64) -> Float {
        Float::with_val(PRECISION_BITS, x)
    }

    /// Probability density at `x`. Zero for `x < location`.
    pub fn pdf_eval(&self, x: f64) -> Float {
        if x < self.location {
            return Self::prec(0.0);
        }
        let ratio = (Self::prec(x) - self.location) / self.scale;
        let alpha = Self::prec(self.shape);
        let ratio_pow_alpha_minus_1 = ratio.clone().pow(Self::prec(self.shape - 1.0));
        let ratio_pow_alpha = ratio.pow(alpha.clone());
        (alpha / self.scale) * ratio_pow_alpha_minus_1 * (-ratio_pow_alpha).exp()
    }

    /// Cumulative distribution at `x`. Zero for `x < location`.
    pub fn cdf_eval(&self, x: f64) -> Float {
        if x < self.location {
            return Self::prec(0.0);
        }
        let ratio = (Self::prec(x) - self.location) / self.scale;
        let alpha = Self::prec(self.shape);
        let ratio_pow_alpha = ratio.pow(alpha);
        Self::prec(1.0) - (-ratio_pow_alpha).exp()
    }

    /// Survival function `1 - cdf(x)`.
    pub fn survival_eval(&self, x: f64) -> Float {
        if x < self.location {
            return Self::prec(1.0);
        }
        let ratio = (Self::prec(x) - self.location) / self.scale;
        let alpha = Self::prec(self.shape);
        let ratio_pow_alpha = ratio.pow(alpha);
        (-ratio_pow_alpha).exp()
    }

    /// Instantaneous failure rate `pdf(x) / survival(x)`.
    pub fn hazard_rate(&self, x: f64) -> Float {
        let survival = self.survival_eval(x);
        if survival == Self::prec(0.0) {
            return Self::prec(0.0);
        }
        self.pdf_eval(x) / survival
    }

    /// An ordinary draw from the distribution (double precision — only
    /// used to seed subsequent high-precision bookkeeping).
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let dist = rand_distr::Weibull::new(self.scale, self.shape)
            .expect("weibull scale and shape must be positive");
        dist.sample(rng) + self.location
    }

    /// Residual-lifetime draw given the component has already survived to
    /// age `t`: the time until the *next* failure, conditioned on no
    /// failure so far. Uses inverse-transform sampling at high precision:
    ///
    /// `delta = |((-lambda^alpha * ln(u) + t^alpha)^(1/alpha)) - t|`
    ///
    /// with `u` redrawn until nonzero (ln(0) is undefined).
    pub fn draw_inverse_transform<R: Rng + ?Sized>(&self, rng: &mut R, t: f64) -> f64 {
        let u = loop {
            let candidate: f64 = rng.r#gen();
            if candidate != 0.0 {
                break candidate;
            }
        };

        let lambda = Self::prec(self.scale);
        let alpha = Self::prec(self.shape);
        let t_f = Self::prec(t);

        let lambda_pow_alpha = lambda.pow(alpha.clone());
        let t_pow_alpha = t_f.clone().pow(alpha.clone());
        let ln_u = Self::prec(u).ln();
        let inner = -lambda_pow_alpha * ln_u + t_pow_alpha;
        let inv_alpha = Self::prec(1.0) / alpha;
        let root = inner.pow(inv_alpha);

        (root - t_f).abs().to_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn exponential_special_case_hazard_is_constant() {
        let w = Weibull::new(1.0, 10.0, 0.0);
        let h1 = w.hazard_rate(1.0).to_f64();
        let h2 = w.hazard_rate(100.0).to_f64();
        assert!((h1 - 1.0 / 10.0).abs() < 1e-9);
        assert!((h2 - 1.0 / 10.0).abs() < 1e-9);
    }

    #[test]
    fn cdf_is_zero_below_location_and_one_in_the_limit() {
        let w = Weibull::new(2.0, 5.0, 1.0);
        assert_eq!(w.cdf_eval(0.5).to_f64(), 0.0);
        assert!(w.cdf_eval(1_000_000.0).to_f64() > 0.999_999);
    }

    #[test]
    fn draw_is_reproducible_given_a_seed() {
        let w = Weibull::new(1.5, 20.0, 0.0);
        let mut r1 = StdRng::seed_from_u64(42);
        let mut r2 = StdRng::seed_from_u64(42);
        assert_eq!(w.draw(&mut r1), w.draw(&mut r2));
    }

    #[test]
    fn inverse_transform_draw_is_nonnegative() {
        let w = Weibull::new(1.2, 50.0, 0.0);
        let mut rng = StdRng::seed_from_u64(7);
        for age in [0.0, 10.0, 1000.0] {
            let delta = w.draw_inverse_transform(&mut rng, age);
            assert!(delta >= 0.0);
        }
    }
}
