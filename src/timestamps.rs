//! Timestamp planner: spreads `N` packet timestamps over `[t0, t1]`,
//! respecting an optional maximum inter-packet gap.

use crate::random::Rng;

/// Plans `n` non-decreasing timestamps (nanoseconds) in `[t0, t1]`.
///
/// - `n == 0` returns an empty vector.
/// - `n == 1` requires `t0 == t1` and returns `[t0]`.
/// - Otherwise draws `n - 2` uniform values in `(t0, t1)`, sorts them, and
///   prepends `t0`/appends `t1`.
///
/// When `max_gap_ns` is set, gaps exceeding it are clamped and the excess is
/// redistributed across gaps with remaining room. If the total cap budget is
/// smaller than the required span, the flow is infeasible as planned: `t1`
/// is trimmed toward `t0` until the remaining span fits within `n-1` gaps of
/// at most `max_gap_ns` each.
///
/// # Panics
///
/// Panics if `n == 1` and `t0 != t1`, or if `t0 > t1`.
pub fn plan_timestamps(rng: &mut Rng, n: usize, t0: u64, t1: u64, max_gap_ns: Option<u64>) -> Vec<u64> {
    assert!(t0 <= t1, "plan_timestamps requires t0 <= t1");
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        assert_eq!(t0, t1, "plan_timestamps with n=1 requires t0 == t1");
        return vec![t0];
    }

    let mut ts = Vec::with_capacity(n);
    ts.push(t0);
    if n > 2 && t1 > t0 {
        let mut middle: Vec<u64> = (0..n - 2).map(|_| rng.uniform_range(t0 + 1, t1.saturating_sub(1).max(t0 + 1))).collect();
        middle.sort_unstable();
        ts.extend(middle);
    } else if n > 2 {
        // t0 == t1: every timestamp must coincide.
        ts.extend(std::iter::repeat(t0).take(n - 2));
    }
    ts.push(t1);

    let Some(max_gap) = max_gap_ns else {
        return ts;
    };

    let required_span = t1 - t0;
    let cap_budget = max_gap.saturating_mul((n - 1) as u64);

    if cap_budget < required_span {
        // Infeasible: trim t1 toward t0 so the span fits exactly within the
        // gap budget, then re-plan the interior points over the new, smaller
        // span.
        let new_t1 = t0 + cap_budget;
        return plan_timestamps(rng, n, t0, new_t1, max_gap_ns);
    }

    // Clamp any gap above max_gap, redistributing the excess across gaps
    // that still have room.
    loop {
        let mut gaps: Vec<u64> = ts.windows(2).map(|w| w[1] - w[0]).collect();
        let mut excess = 0u64;
        let mut over_indices = Vec::new();
        for (i, g) in gaps.iter_mut().enumerate() {
            if *g > max_gap {
                excess += *g - max_gap;
                *g = max_gap;
                over_indices.push(i);
            }
        }
        if excess == 0 {
            break;
        }
        let under_indices: Vec<usize> = (0..gaps.len())
            .filter(|i| !over_indices.contains(i) && gaps[*i] < max_gap)
            .collect();
        if under_indices.is_empty() {
            // No room left anywhere; the earlier cap_budget check guarantees
            // this shouldn't happen, but guard against infinite loop.
            break;
        }
        let share = excess / under_indices.len() as u64;
        let mut remainder = excess % under_indices.len() as u64;
        for &i in &under_indices {
            let room = max_gap - gaps[i];
            let mut add = share.min(room);
            if remainder > 0 && add < room {
                add += 1;
                remainder -= 1;
            }
            gaps[i] += add;
        }
        // Rebuild ts from gaps.
        let mut rebuilt = Vec::with_capacity(ts.len());
        rebuilt.push(t0);
        let mut acc = t0;
        for g in gaps {
            acc += g;
            rebuilt.push(acc);
        }
        *rebuilt.last_mut().unwrap() = t1.min(*rebuilt.last().unwrap());
        ts = rebuilt;
    }

    ts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_for_zero() {
        let mut rng = Rng::new(1);
        assert_eq!(plan_timestamps(&mut rng, 0, 0, 100, None), Vec::<u64>::new());
    }

    #[test]
    fn single_requires_equal_bounds() {
        let mut rng = Rng::new(1);
        assert_eq!(plan_timestamps(&mut rng, 1, 42, 42, None), vec![42]);
    }

    #[test]
    fn non_decreasing_and_bounded() {
        let mut rng = Rng::new(123);
        let ts = plan_timestamps(&mut rng, 10, 0, 50_000_000_000, Some(10_000_000_000));
        assert_eq!(ts.first().copied(), Some(0));
        assert_eq!(ts.last().copied(), Some(50_000_000_000));
        for w in ts.windows(2) {
            assert!(w[1] >= w[0]);
            assert!(w[1] - w[0] <= 10_000_000_000);
        }
    }

    #[test]
    fn infeasible_trims_last_timestamp() {
        let mut rng = Rng::new(5);
        // t0=10s, t1=100s, maxGap=1s, n=10 -> cap budget 9s < 90s required.
        let ts = plan_timestamps(&mut rng, 10, 10_000_000_000, 100_000_000_000, Some(1_000_000_000));
        assert_eq!(ts.first().copied(), Some(10_000_000_000));
        assert_eq!(ts.last().copied(), Some(19_000_000_000));
        for w in ts.windows(2) {
            assert!(w[1] - w[0] <= 1_000_000_000);
        }
    }
}
