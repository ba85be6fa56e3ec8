//! Broadcast interval selection.
//!
//! Nodes that restart together would otherwise broadcast in lockstep.  Each
//! cycle draws a fresh delay uniformly from `[min, max]` using a generator
//! seeded from the operating system's entropy source, so intervals are not
//! predictable from a shared start time.

use std::time::Duration;

use log::warn;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};

pub trait IntervalProvider: Send + Sync {
    fn next_interval(&mut self) -> Duration;
}

/// Uniform delay in `[min, max]` at millisecond resolution.
#[derive(Debug, Clone)]
pub struct OsJitter {
    min: Duration,
    max: Duration,
}

impl OsJitter {
    /// `min` and `max` are swapped if given out of order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

impl IntervalProvider for OsJitter {
    fn next_interval(&mut self) -> Duration {
        self.draw_from(OsRng)
    }
}

impl OsJitter {
    /// Seeds a generator from `entropy` and draws one delay.  Falls back to
    /// `min` when the entropy source fails.
    fn draw_from<R: RngCore>(&self, entropy: R) -> Duration {
        let mut rng = match StdRng::from_rng(entropy) {
            Ok(rng) => rng,
            Err(e) => {
                warn!("OS randomness unavailable ({}), using minimum interval", e);
                return self.min;
            }
        };
        let lo = saturating_millis(self.min);
        let hi = saturating_millis(self.max);
        Duration::from_millis(rng.gen_range(lo..=hi))
    }
}

/// Millisecond count clamped to `u64`, so ordering of the bounds survives.
fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_stay_within_bounds() {
        let min = Duration::from_secs(2);
        let max = Duration::from_secs(5);
        let mut jitter = OsJitter::new(min, max);
        for _ in 0..2_000 {
            let d = jitter.next_interval();
            assert!(d >= min && d <= max, "{d:?} outside [{min:?}, {max:?}]");
        }
    }

    #[test]
    fn draws_are_spread_across_the_range() {
        let mut jitter = OsJitter::new(Duration::from_secs(1), Duration::from_secs(3));
        let (mut low, mut high) = (false, false);
        for _ in 0..2_000 {
            let d = jitter.next_interval();
            low |= d < Duration::from_millis(1_500);
            high |= d > Duration::from_millis(2_500);
        }
        assert!(low && high);
    }

    #[test]
    fn degenerate_range_returns_bound() {
        let mut jitter = OsJitter::new(Duration::from_secs(4), Duration::from_secs(4));
        assert_eq!(jitter.next_interval(), Duration::from_secs(4));
    }

    /// Entropy source that always fails.
    struct BrokenEntropy;

    impl RngCore for BrokenEntropy {
        fn next_u32(&mut self) -> u32 {
            unreachable!("seeding only uses try_fill_bytes")
        }

        fn next_u64(&mut self) -> u64 {
            unreachable!("seeding only uses try_fill_bytes")
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unreachable!("seeding only uses try_fill_bytes")
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "entropy pool unavailable",
            )))
        }
    }

    #[test]
    fn entropy_failure_falls_back_to_minimum() {
        let jitter = OsJitter::new(Duration::from_secs(3), Duration::from_secs(8));
        for _ in 0..10 {
            assert_eq!(jitter.draw_from(BrokenEntropy), Duration::from_secs(3));
        }
    }

    #[test]
    fn huge_bounds_do_not_panic() {
        let min = Duration::from_secs(18_446_744_073_709_551);
        let max = min + Duration::from_secs(1);
        let mut jitter = OsJitter::new(min, max);
        for _ in 0..200 {
            let d = jitter.next_interval();
            assert!(d >= min && d <= max, "{d:?} outside [{min:?}, {max:?}]");
        }
        let mut extreme = OsJitter::new(Duration::MAX - Duration::from_secs(1), Duration::MAX);
        assert_eq!(extreme.next_interval(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn reversed_bounds_are_normalised() {
        let mut jitter = OsJitter::new(Duration::from_secs(9), Duration::from_secs(3));
        for _ in 0..200 {
            let d = jitter.next_interval();
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(9));
        }
    }
}
