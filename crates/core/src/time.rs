//! Rational time bases and timestamp rescaling.
//!
//! Camera timestamps arrive in microseconds. The RTP stream counts in its
//! own clock (90 kHz for video, RFC 3551 §5), so every presentation
//! timestamp, decode timestamp and duration is rescaled before it reaches
//! the muxer.

use std::fmt;

/// Sentinel for "no timestamp". Never rescaled.
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Time base of caller-supplied frame times.
pub const MICROSECONDS: Rational = Rational::new(1, 1_000_000);

/// RTP video clock (RFC 3551 §5).
pub const RTP_VIDEO_CLOCK: Rational = Rational::new(1, 90_000);

/// A rational number `num / den`, used as the duration of one timestamp tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Whether this is usable as a time base (strictly positive).
    pub const fn is_valid_time_base(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rescale `value` from time base `from` to time base `to`.
///
/// Computes `value * from.num * to.den / (from.den * to.num)` in 128-bit
/// arithmetic, rounding to nearest with ties away from zero. Results that
/// do not fit in an `i64` saturate; the minimum is clamped one above
/// [`NO_TIMESTAMP`] so a real timestamp can never turn into the sentinel.
///
/// [`NO_TIMESTAMP`] passes through unchanged.
///
/// # Panics
///
/// Panics if `to.num` or `from.den` is zero (a degenerate time base).
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    if value == NO_TIMESTAMP {
        return NO_TIMESTAMP;
    }

    let num = value as i128 * from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;
    assert!(den != 0, "degenerate time base: {from} -> {to}");

    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };

    rounded.clamp(NO_TIMESTAMP as i128 + 1, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn microseconds_to_rtp_clock() {
        // One frame at 24 fps
        assert_eq!(rescale(41_667, MICROSECONDS, RTP_VIDEO_CLOCK), 3750);
        assert_eq!(rescale(1_000_000, MICROSECONDS, RTP_VIDEO_CLOCK), 90_000);
    }

    #[test]
    fn rounds_to_nearest() {
        let tenth = Rational::new(1, 10);
        let unit = Rational::new(1, 1);
        assert_eq!(rescale(14, tenth, unit), 1);
        assert_eq!(rescale(15, tenth, unit), 2);
        assert_eq!(rescale(-14, tenth, unit), -1);
        assert_eq!(rescale(-15, tenth, unit), -2);
    }

    #[test]
    fn sentinel_is_not_rescaled() {
        assert_eq!(
            rescale(NO_TIMESTAMP, MICROSECONDS, RTP_VIDEO_CLOCK),
            NO_TIMESTAMP
        );
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let seconds = Rational::new(1, 1);
        let nanos = Rational::new(1, 1_000_000_000);
        assert_eq!(rescale(i64::MAX, seconds, nanos), i64::MAX);
        assert_eq!(rescale(i64::MIN + 1, seconds, nanos), i64::MIN + 1);
    }

    fn time_base() -> impl Strategy<Value = Rational> {
        (1..=1000i32, 1..=1_000_000i32).prop_map(|(num, den)| Rational::new(num, den))
    }

    proptest! {
        #[test]
        fn sentinel_passthrough_any_bases(a in time_base(), b in time_base()) {
            prop_assert_eq!(rescale(NO_TIMESTAMP, a, b), NO_TIMESTAMP);
        }

        #[test]
        fn round_trip_through_finer_base(
            v in -(1i64 << 40)..(1i64 << 40),
            a in time_base(),
            refine in 1..=1000i32,
        ) {
            // b ticks are `refine` times shorter than a ticks
            let b = Rational::new(a.num, a.den * refine);
            let back = rescale(rescale(v, a, b), b, a);
            prop_assert!((back - v).abs() <= 1, "v={} back={} a={} b={}", v, back, a, b);
        }

        #[test]
        fn round_trip_arbitrary_finer_base(
            v in -(1i64 << 40)..(1i64 << 40),
            a in time_base(),
            b in time_base(),
        ) {
            // tick(b) <= tick(a)  <=>  b.num * a.den <= a.num * b.den
            prop_assume!((b.num as i64) * (a.den as i64) <= (a.num as i64) * (b.den as i64));
            let back = rescale(rescale(v, a, b), b, a);
            prop_assert!((back - v).abs() <= 1, "v={} back={} a={} b={}", v, back, a, b);
        }
    }
}
