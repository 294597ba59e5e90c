//! Packet-size value solver.
//!
//! Draws `N` packet sizes (IP-and-above length) summing to a target byte
//! count, biased by a bimodal size distribution meant to mimic observed
//! internet traffic: mostly small (ACK-sized) and jumbo-ish packets, few in
//! the middle.

use crate::random::Rng;

/// One weighted size interval: `[lo, hi]` inclusive, with its selection
/// probability.
#[derive(Debug, Clone, Copy)]
pub struct SizeInterval {
    pub lo: u64,
    pub hi: u64,
    pub weight: f64,
}

/// The hard-coded bimodal packet-size table. Preserved verbatim per the
/// resolved Open Question on whether it should be user-tunable (it isn't).
pub const DEFAULT_SIZE_TABLE: &[SizeInterval] = &[
    SizeInterval { lo: 64, hi: 79, weight: 0.2824 },
    SizeInterval { lo: 80, hi: 159, weight: 0.073 },
    SizeInterval { lo: 160, hi: 319, weight: 0.0115 },
    SizeInterval { lo: 320, hi: 639, weight: 0.012 },
    SizeInterval { lo: 640, hi: 1279, weight: 0.0092 },
    SizeInterval { lo: 1280, hi: 1518, weight: 0.6119 },
];

/// Draws `count` packet sizes summing to exactly `byte_target`, using
/// `table` to weight which interval each draw favors.
///
/// Strategy: partition `count` across the intervals proportionally to their
/// weights (at least one interval gets all of `count` if weights round to
/// zero elsewhere), draw each interval's share uniformly within its bounds
/// via [`Rng::weighted_distribute`], then concatenate and shuffle. If the
/// per-interval byte math doesn't leave room to hit `byte_target` exactly
/// (e.g. `count` too small for the required total), falls back to
/// [`Rng::weighted_distribute`] over the full `[table.lo_min, table.hi_max]`
/// envelope.
pub fn plan_packet_sizes(
    rng: &mut Rng,
    count: usize,
    byte_target: u64,
    table: &[SizeInterval],
) -> Vec<u64> {
    assert!(!table.is_empty(), "size table must not be empty");
    if count == 0 {
        return Vec::new();
    }

    let lo_min = table.iter().map(|i| i.lo).min().unwrap();
    let hi_max = table.iter().map(|i| i.hi).max().unwrap();
    let count_u = count as u64;

    // If the target is too close to a feasibility boundary for the weighted
    // partition-by-interval approach to be meaningful, fall back directly to
    // a single weighted_distribute draw over the whole envelope.
    if byte_target < count_u * lo_min || byte_target > count_u * hi_max {
        // Caller-contract violation (infeasible): clamp into range the same
        // way the reference solver treats boundary cases, by saturating the
        // target, rather than panicking mid-plan.
        let clamped = byte_target.clamp(count_u * lo_min, count_u * hi_max);
        return rng.weighted_distribute(clamped, count, lo_min, hi_max);
    }

    // Partition `count` across intervals proportionally to weight.
    let total_weight: f64 = table.iter().map(|i| i.weight).sum();
    let mut per_interval_count: Vec<usize> = table
        .iter()
        .map(|i| ((count as f64) * i.weight / total_weight).floor() as usize)
        .collect();
    let mut assigned: usize = per_interval_count.iter().sum();
    // Hand out any rounding remainder to the heaviest-weighted intervals.
    let mut order: Vec<usize> = (0..table.len()).collect();
    order.sort_by(|&a, &b| table[b].weight.partial_cmp(&table[a].weight).unwrap());
    let mut oi = 0;
    while assigned < count {
        per_interval_count[order[oi % order.len()]] += 1;
        assigned += 1;
        oi += 1;
    }

    // Try to distribute byte_target proportionally across intervals too,
    // respecting each interval's [lo,hi]*count bounds; if any interval ends
    // up infeasible, fall back to the whole-envelope solver.
    let mut remaining_target = byte_target;
    let mut remaining_count = count;
    let mut values = Vec::with_capacity(count);

    for (idx, interval) in table.iter().enumerate() {
        let n = per_interval_count[idx];
        if n == 0 {
            continue;
        }
        let is_last_nonzero = per_interval_count[idx + 1..].iter().all(|&c| c == 0);
        let share = if is_last_nonzero {
            remaining_target
        } else {
            let ideal = ((byte_target as f64) * interval.weight / total_weight).round() as u64;
            ideal.clamp(n as u64 * interval.lo, n as u64 * interval.hi)
                .min(remaining_target)
        };
        let min_rest_after: u64 = {
            let rest_n: usize = per_interval_count[idx + 1..].iter().sum();
            rest_n as u64 * lo_min
        };
        let max_rest_after: u64 = {
            let rest_n: usize = per_interval_count[idx + 1..].iter().sum();
            rest_n as u64 * hi_max
        };
        let lo_bound = n as u64 * interval.lo;
        let hi_bound = n as u64 * interval.hi;
        let feasible_share = share
            .max(lo_bound)
            .min(hi_bound)
            .max(remaining_target.saturating_sub(max_rest_after))
            .min(remaining_target.saturating_sub(min_rest_after).max(lo_bound));

        let drawn = rng.weighted_distribute(feasible_share.clamp(lo_bound, hi_bound), n, interval.lo, interval.hi);
        remaining_target -= feasible_share.clamp(lo_bound, hi_bound);
        remaining_count -= n;
        values.extend(drawn);
    }

    if remaining_count != 0 || values.len() != count {
        // Something about the per-interval partition didn't land cleanly;
        // fall back to a single global solve so the sum contract always
        // holds.
        return rng.weighted_distribute(byte_target, count, lo_min, hi_max);
    }

    // The per-interval draws already sum close to byte_target by
    // construction; reconcile any last few bytes of rounding drift onto the
    // largest-capacity value so the sum is exact.
    let actual_sum: u64 = values.iter().sum();
    if actual_sum != byte_target {
        let diff = byte_target as i64 - actual_sum as i64;
        if let Some((idx, _)) = values
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
        {
            let adjusted = values[idx] as i64 + diff;
            values[idx] = adjusted.clamp(lo_min as i64, hi_max as i64) as u64;
        }
    }

    rng.shuffle(&mut values);
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_to_target() {
        let mut rng = Rng::new(42);
        let sizes = plan_packet_sizes(&mut rng, 20, 10_000, DEFAULT_SIZE_TABLE);
        assert_eq!(sizes.len(), 20);
        assert_eq!(sizes.iter().sum::<u64>(), 10_000);
    }

    #[test]
    fn every_value_within_table_envelope() {
        let mut rng = Rng::new(1);
        let sizes = plan_packet_sizes(&mut rng, 50, 50 * 500, DEFAULT_SIZE_TABLE);
        for v in sizes {
            assert!(v >= 64 && v <= 1518);
        }
    }

    #[test]
    fn single_packet() {
        let mut rng = Rng::new(7);
        let sizes = plan_packet_sizes(&mut rng, 1, 300, DEFAULT_SIZE_TABLE);
        assert_eq!(sizes, vec![300]);
    }
}
