//! Token-bucket rate limiter paced by a monotonic clock. Three exclusive
//! modes share one bucket implementation: packets-per-second (1
//! token/packet), bytes-per-second (1 token/byte of IP-and-above length),
//! and replay-time (1 token/ns of gap between successive original packet
//! timestamps).

use std::time::Instant;

/// When `tokensPerSecond` exceeds 1e9, converting between tokens and
/// nanoseconds in pure integer math would need >64 bits of headroom. This
/// bit-shifts the numerator down before the division and compensates by
/// shifting the result back up, keeping every intermediate in 64 bits.
const PRECISION_SHIFT_THRESHOLD: u64 = 1_000_000_000;
const PRECISION_SHIFT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMode {
    PacketsPerSecond,
    BytesPerSecond,
    ReplayTime,
}

pub struct RateLimiter {
    mode: RateMode,
    tokens_per_second: u64,
    bucket: f64,
    last_refill: Instant,
    last_packet_timestamp_ns: Option<u64>,
}

impl RateLimiter {
    pub fn new(mode: RateMode, tokens_per_second: u64) -> Self {
        RateLimiter {
            mode,
            tokens_per_second: tokens_per_second.max(1),
            bucket: 0.0,
            last_refill: Instant::now(),
            last_packet_timestamp_ns: None,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_ns = now.saturating_duration_since(self.last_refill).as_nanos() as u64;
        self.last_refill = now;

        let new_tokens = self.tokens_for_elapsed_ns(elapsed_ns);
        self.bucket += new_tokens as f64;

        // Clamp on falling behind by more than one second's worth of
        // tokens so a long pause (GC, scheduler preemption) doesn't let the
        // bucket "catch up" by bursting far faster than the configured
        // rate once work resumes.
        let cap = self.tokens_per_second as f64;
        if self.bucket > cap {
            self.bucket = cap;
        }
    }

    fn tokens_for_elapsed_ns(&self, elapsed_ns: u64) -> u64 {
        if self.tokens_per_second > PRECISION_SHIFT_THRESHOLD {
            let shifted_rate = self.tokens_per_second >> PRECISION_SHIFT;
            (elapsed_ns.saturating_mul(shifted_rate) / 1_000_000_000) << PRECISION_SHIFT
        } else {
            elapsed_ns.saturating_mul(self.tokens_per_second) / 1_000_000_000
        }
    }

    /// Blocks (busy-waits with short sleeps) until `n` tokens are
    /// available, then withdraws them.
    pub fn limit(&mut self, n: u64) {
        loop {
            self.refill();
            if self.bucket >= n as f64 {
                self.bucket -= n as f64;
                return;
            }
            let deficit = n as f64 - self.bucket;
            let wait_ns = (deficit * 1_000_000_000.0 / self.tokens_per_second as f64).max(0.0) as u64;
            std::thread::sleep(std::time::Duration::from_nanos(wait_ns.min(10_000_000)));
        }
    }

    /// Paces by original inter-packet gap rather than a configured
    /// pps/bps rate: call once per packet with its original timestamp.
    pub fn limit_replay_time(&mut self, original_timestamp_ns: u64) {
        if self.mode != RateMode::ReplayTime {
            return;
        }
        if let Some(prev) = self.last_packet_timestamp_ns {
            let gap_ns = original_timestamp_ns.saturating_sub(prev);
            if gap_ns > 0 {
                self.limit(gap_ns);
            }
        }
        self.last_packet_timestamp_ns = Some(original_timestamp_ns);
    }

    pub fn mode(&self) -> RateMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pps_limiter_bounds_throughput_over_one_second() {
        let mut limiter = RateLimiter::new(RateMode::PacketsPerSecond, 1000);
        let start = Instant::now();
        let mut sent = 0u64;
        while start.elapsed() < std::time::Duration::from_millis(100) {
            limiter.limit(1);
            sent += 1;
        }
        // At 1000 pps over ~100ms we expect roughly 100 packets; generous
        // bounds since CI/test timing jitter is real.
        assert!(sent <= 400, "sent {sent} packets, expected roughly rate-bounded throughput");
    }

    #[test]
    fn precision_shift_path_does_not_panic_at_high_rates() {
        let mut limiter = RateLimiter::new(RateMode::BytesPerSecond, 50_000_000_000);
        limiter.limit(1500);
    }

    #[test]
    fn replay_time_mode_ignores_first_packet_gap() {
        let mut limiter = RateLimiter::new(RateMode::ReplayTime, 1);
        let before = Instant::now();
        limiter.limit_replay_time(1_000_000_000);
        assert!(before.elapsed() < std::time::Duration::from_millis(50));
    }
}
