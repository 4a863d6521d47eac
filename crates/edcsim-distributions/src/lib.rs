//! Probability distributions driving device failure/repair times.
//!
//! The only distribution family the simulator needs is the 3-parameter
//! Weibull (shape, scale, location); with shape = 1 it degenerates to the
//! exponential. Evaluation of the pdf/cdf/hazard-rate and the
//! residual-lifetime inverse-transform draw is done at high precision
//! because likelihood-ratio weights derived from them can underflow `f64`
//! over a long mission.

mod weibull;

pub use weibull::Weibull;

/// Working precision for high-precision evaluation, in bits (~100 decimal digits).
pub const PRECISION_BITS: u32 = 333;
