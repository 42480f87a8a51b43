//! Wall-clock pacing of decoded samples.
//!
//! The pacer turns elapsed tick time into a fractional sample credit and
//! releases whole samples against it, so irregular tick lengths neither
//! drift nor burst past what real time allows.

use std::time::Duration;

/// Credit this close to a whole number is snapped onto it after accruing, so
/// e.g. 10 ms at 48 kHz yields exactly 480 samples, not 479. Snapping can add
/// or remove at most this much credit per tick.
const CREDIT_EPSILON: f64 = 1e-7;

/// Fractional sample-credit accumulator.
#[derive(Clone, Debug)]
pub struct Pacer {
    samples_per_second: f64,
    credit: f64,
    released_total: u64,
}

impl Pacer {
    /// `samples_per_second` is `rate * channels` of the paced stream.
    pub fn new(samples_per_second: f64) -> Self {
        let samples_per_second = if samples_per_second.is_finite() && samples_per_second > 0.0 {
            samples_per_second
        } else {
            0.0
        };
        Self {
            samples_per_second,
            credit: 0.0,
            released_total: 0,
        }
    }

    /// Current fractional credit.
    pub fn credit(&self) -> f64 {
        self.credit
    }

    /// Whole samples the current credit allows.
    pub fn budget(&self) -> usize {
        self.credit.floor() as usize
    }

    pub fn released_total(&self) -> u64 {
        self.released_total
    }

    /// Earn credit for `elapsed` wall-clock time.
    pub fn accrue(&mut self, elapsed: Duration) {
        let earned = elapsed.as_secs_f64() * self.samples_per_second;
        if earned.is_finite() && earned > 0.0 {
            self.credit += earned;
            let whole = self.credit.round();
            if (self.credit - whole).abs() < CREDIT_EPSILON {
                self.credit = whole;
            }
        }
    }

    /// Release up to `available` samples against the credit.
    ///
    /// Returns `min(floor(credit), available)` and deducts it from the credit,
    /// which therefore never goes negative.
    pub fn release(&mut self, available: usize) -> usize {
        let released = self.budget().min(available);
        self.credit -= released as f64;
        self.released_total += released as u64;
        released
    }

    /// Forget all credit.
    pub fn reset(&mut self) {
        self.credit = 0.0;
        self.released_total = 0;
    }
}
