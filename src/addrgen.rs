//! Prefix-constrained address generation.
//!
//! The core primitive is a maximal-length Fibonacci LFSR: for an address
//! whose top `prefixLen` bits are fixed, the low `n - prefixLen` bits must
//! sweep every value exactly once (including the all-zero suffix, spliced in
//! once per period) before repeating. [`Lfsr`] implements that sweep using a
//! precomputed table of primitive polynomials over GF(2).

use crate::random::Rng;

/// Feedback tap positions (1-indexed from the MSB of the shift register) for
/// a primitive polynomial of each degree from 0 to 128. Index `m` holds the
/// taps for a degree-`m` maximal-length LFSR; degree 0 has no taps and acts
/// as a no-op generator (spec scenario: "LFSR 0-bit — empty state, `Next()`
/// is a no-op").
#[rustfmt::skip]
const PRIMITIVE_POLYNOMIALS: &[&[u8]] = &[
    &[],                    // 0
    &[1],                   // 1
    &[2, 1],                // 2
    &[3, 2],                // 3
    &[4, 3],                // 4
    &[5, 3],                // 5
    &[6, 5],                // 6
    &[7, 6],                // 7
    &[8, 6, 5, 4],          // 8
    &[9, 5],                // 9
    &[10, 7],               // 10
    &[11, 9],               // 11
    &[12, 6, 4, 1],         // 12
    &[13, 4, 3, 1],         // 13
    &[14, 5, 3, 1],         // 14
    &[15, 14],              // 15
    &[16, 15, 13, 4],       // 16
    &[17, 14],              // 17
    &[18, 11],              // 18
    &[19, 6, 2, 1],         // 19
    &[20, 17],              // 20
    &[21, 19],              // 21
    &[22, 21],              // 22
    &[23, 18],              // 23
    &[24, 23, 22, 17],      // 24
    &[25, 22],              // 25
    &[26, 6, 2, 1],         // 26
    &[27, 5, 2, 1],         // 27
    &[28, 25],              // 28
    &[29, 27],              // 29
    &[30, 6, 4, 1],         // 30
    &[31, 28],              // 31
    &[32, 22, 2, 1],        // 32
    &[33, 20],              // 33
    &[34, 27, 2, 1],        // 34
    &[35, 33],              // 35
    &[36, 25],              // 36
    &[37, 5, 4, 3, 2, 1],   // 37
    &[38, 6, 5, 1],         // 38
    &[39, 35],              // 39
    &[40, 38, 21, 19],      // 40
    &[41, 38],              // 41
    &[42, 41, 20, 19],      // 42
    &[43, 42, 38, 37],      // 43
    &[44, 43, 18, 17],      // 44
    &[45, 44, 42, 41],      // 45
    &[46, 45, 26, 25],      // 46
    &[47, 42],              // 47
    &[48, 47, 21, 20],      // 48
    &[49, 40],              // 49
    &[50, 49, 24, 23],      // 50
    &[51, 50, 36, 35],      // 51
    &[52, 49],              // 52
    &[53, 52, 38, 37],      // 53
    &[54, 53, 18, 17],      // 54
    &[55, 31],              // 55
    &[56, 55, 35, 34],      // 56
    &[57, 50],              // 57
    &[58, 39],              // 58
    &[59, 58, 38, 37],      // 59
    &[60, 59],              // 60
    &[61, 60, 46, 45],      // 61
    &[62, 61, 6, 5],        // 62
    &[63, 62],              // 63
    &[64, 63, 61, 60],      // 64
    &[65, 47],              // 65
    &[66, 65, 57, 56],      // 66
    &[67, 66, 58, 57],      // 67
    &[68, 59],              // 68
    &[69, 67, 42, 40],      // 69
    &[70, 69, 55, 54],      // 70
    &[71, 65],              // 71
    &[72, 66, 25, 19],      // 72
    &[73, 48],              // 73
    &[74, 73, 59, 58],      // 74
    &[75, 74, 65, 64],      // 75
    &[76, 75, 41, 40],      // 76
    &[77, 76, 47, 46],      // 77
    &[78, 77, 59, 58],      // 78
    &[79, 70],              // 79
    &[80, 79, 43, 42],      // 80
    &[81, 77],              // 81
    &[82, 79, 47, 44],      // 82
    &[83, 82, 38, 37],      // 83
    &[84, 71],              // 84
    &[85, 84, 58, 57],      // 85
    &[86, 85, 74, 73],      // 86
    &[87, 74],              // 87
    &[88, 87, 17, 16],      // 88
    &[89, 51],              // 89
    &[90, 89, 72, 71],      // 90
    &[91, 90, 8, 7],        // 91
    &[92, 91, 80, 79],      // 92
    &[93, 91],              // 93
    &[94, 93],              // 94
    &[95, 84],              // 95
    &[96, 94, 49, 47],      // 96
    &[97, 91],              // 97
    &[98, 87],              // 98
    &[99, 97, 54, 52],      // 99
    &[100, 63],             // 100
    &[101, 100, 95, 94],    // 101
    &[102, 101, 36, 35],    // 102
    &[103, 94],             // 103
    &[104, 103, 94, 93],    // 104
    &[105, 89],             // 105
    &[106, 91],             // 106
    &[107, 105, 44, 42],    // 107
    &[108, 77],             // 108
    &[109, 108, 103, 102],  // 109
    &[110, 109, 98, 97],    // 110
    &[111, 101],            // 111
    &[112, 110, 69, 67],    // 112
    &[113, 104],            // 113
    &[114, 113, 33, 32],    // 114
    &[115, 114, 101, 100],  // 115
    &[116, 115, 46, 45],    // 116
    &[117, 115, 99, 97],    // 117
    &[118, 85],             // 118
    &[119, 111],            // 119
    &[120, 113, 9, 2],      // 120
    &[121, 103],            // 121
    &[122, 121, 63, 62],    // 122
    &[123, 121],            // 123
    &[124, 87],             // 124
    &[125, 124, 18, 17],    // 125
    &[126, 125, 90, 89],    // 126
    &[127, 126],            // 127
    &[128, 126, 101, 99],   // 128
];

/// A maximal-length Fibonacci LFSR of `degree` bits.
///
/// Sweeps every non-zero `degree`-bit value exactly once, then returns to its
/// initial state; [`Lfsr::next`] detects that return and splices in the
/// all-zero state exactly once per period so that all `2^degree` suffixes
/// (including zero) are produced.
#[derive(Debug, Clone)]
pub struct Lfsr {
    degree: u8,
    taps: &'static [u8],
    initial: u64,
    state: u64,
    emitted_zero_this_period: bool,
}

impl Lfsr {
    /// Creates an LFSR of the given `degree` (0..=128), seeded from `rng`.
    ///
    /// Degree 0 produces a no-op generator: [`Lfsr::next`] always returns 0.
    pub fn new(degree: u8, rng: &mut Rng) -> Self {
        assert!(degree <= 128, "Lfsr degree must be <= 128");
        let taps = PRIMITIVE_POLYNOMIALS[degree as usize];
        let initial = if degree == 0 {
            0
        } else {
            // Any non-zero seed works; draw one from the RNG.
            let mask: u128 = if degree == 64 {
                u64::MAX as u128
            } else {
                (1u128 << degree) - 1
            };
            loop {
                let v = (rng.next_u64() as u128) & mask;
                if v != 0 || degree == 0 {
                    break v as u64;
                }
            }
        };
        Lfsr {
            degree,
            taps,
            initial,
            state: initial,
            emitted_zero_this_period: false,
        }
    }

    /// Degree of this LFSR, in bits.
    pub fn degree(&self) -> u8 {
        self.degree
    }

    /// The natural period of the non-zero sweep, `2^degree - 1` (0 for a
    /// degree-0 generator).
    pub fn period(&self) -> u128 {
        if self.degree == 0 { 0 } else { (1u128 << self.degree) - 1 }
    }

    fn step(&mut self) -> u64 {
        let mut feedback = 0u64;
        for &tap in self.taps {
            feedback ^= (self.state >> (tap as u64 - 1)) & 1;
        }
        self.state = (self.state >> 1) | (feedback << (self.degree as u64 - 1));
        self.state
    }

    /// Produces the next value in the sweep.
    ///
    /// For a degree-0 generator this is always a no-op returning 0.
    pub fn next(&mut self) -> u64 {
        if self.degree == 0 {
            return 0;
        }

        if self.emitted_zero_this_period {
            // We just emitted the spliced zero; resume the sweep from the
            // initial state without consuming another real step.
            self.emitted_zero_this_period = false;
            self.state = self.initial;
            return self.state;
        }

        let next_state = self.step();
        if next_state == self.initial {
            // We've completed the natural 2^degree - 1 sweep. Splice in the
            // all-zero suffix exactly once before the next real step.
            self.emitted_zero_this_period = true;
            return 0;
        }
        next_state
    }
}

/// Generates addresses over the free low-order bits of a fixed-prefix base
/// address, using [`Lfsr`] to guarantee a full, non-repeating sweep.
///
/// Invariant: every output preserves the base's top `prefix_len` bits;
/// period is exactly `2^(total_bits - prefix_len)`.
#[derive(Debug, Clone)]
pub struct PrefixedGenerator {
    base: Vec<u8>,
    prefix_len: u8,
    total_bits: u8,
    lfsr: Lfsr,
}

impl PrefixedGenerator {
    /// `base` is the address in network byte order; `prefix_len` is the
    /// number of fixed high-order bits (e.g. 24 for a /24 IPv4 range).
    pub fn new(base: Vec<u8>, prefix_len: u8, rng: &mut Rng) -> Self {
        let total_bits = (base.len() * 8) as u8;
        assert!(prefix_len <= total_bits, "prefix_len exceeds address width");
        let free_bits = total_bits - prefix_len;
        PrefixedGenerator {
            base,
            prefix_len,
            total_bits,
            lfsr: Lfsr::new(free_bits, rng),
        }
    }

    /// Number of distinct addresses this generator can produce before
    /// repeating.
    pub fn period(&self) -> u128 {
        let free_bits = self.total_bits - self.prefix_len;
        if free_bits == 0 { 1 } else { 1u128 << free_bits }
    }

    /// Draws the next address, preserving the fixed prefix and injecting the
    /// LFSR's output into the low-order free bits.
    pub fn next(&mut self) -> Vec<u8> {
        let suffix = self.lfsr.next();
        let free_bits = self.total_bits - self.prefix_len;
        let mut addr = self.base.clone();
        let total_bytes = addr.len();

        let mut bits_left = free_bits as u32;
        let mut suffix_bits = suffix;
        for i in (0..total_bytes).rev() {
            if bits_left == 0 {
                break;
            }
            let take = bits_left.min(8);
            let mask: u8 = if take == 8 { 0xFF } else { (1u8 << take) - 1 };
            let bits = (suffix_bits & (mask as u64)) as u8;
            addr[i] = (addr[i] & !mask) | bits;
            suffix_bits >>= take;
            bits_left -= take;
        }
        addr
    }
}

/// Selects uniformly among several configured prefix generators.
pub struct MultiRangeGenerator {
    ranges: Vec<PrefixedGenerator>,
}

impl MultiRangeGenerator {
    pub fn new(ranges: Vec<PrefixedGenerator>) -> Self {
        assert!(!ranges.is_empty(), "MultiRangeGenerator requires at least one range");
        MultiRangeGenerator { ranges }
    }

    /// Draws the next address from a uniformly-chosen range.
    pub fn next(&mut self, rng: &mut Rng) -> Vec<u8> {
        let idx = rng.uniform_u64(self.ranges.len() as u64) as usize;
        self.ranges[idx].next()
    }
}

/// Generates MAC addresses honoring the IEEE 802.3-2002 §3.2.3(b) group-bit
/// rule: the LSB of the first octet must be 0 (individual address) unless
/// the configured prefix itself forces it to 1.
pub struct MacGenerator {
    inner: PrefixedGenerator,
}

impl MacGenerator {
    pub fn new(base: [u8; 6], prefix_len: u8, rng: &mut Rng) -> Self {
        if prefix_len <= 7 && base[0] & 1 != 0 {
            log::warn!(
                "base MAC {:02x?} has the group bit set but prefix_len={} leaves it free; \
                 generated addresses will still avoid group addresses",
                base,
                prefix_len
            );
        }
        MacGenerator {
            inner: PrefixedGenerator::new(base.to_vec(), prefix_len, rng),
        }
    }

    /// Draws the next MAC address, retrying while the group bit ends up set
    /// and the prefix doesn't force it.
    pub fn next(&mut self) -> [u8; 6] {
        let forces_group_bit = self.inner.prefix_len <= 7 && self.inner.base[0] & 1 != 0;
        loop {
            let addr = self.inner.next();
            if forces_group_bit || addr[0] & 1 == 0 {
                return addr.try_into().expect("MAC address is always 6 bytes");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_zero_is_noop() {
        let mut rng = Rng::new(1);
        let mut lfsr = Lfsr::new(0, &mut rng);
        assert_eq!(lfsr.next(), 0);
        assert_eq!(lfsr.next(), 0);
        assert_eq!(lfsr.period(), 0);
    }

    #[test]
    fn small_degree_sweeps_full_period_including_zero() {
        let mut rng = Rng::new(77);
        let degree = 8u8;
        let mut lfsr = Lfsr::new(degree, &mut rng);
        let total = 1usize << degree;
        let mut seen = std::collections::HashSet::new();
        for _ in 0..total {
            seen.insert(lfsr.next());
        }
        assert_eq!(seen.len(), total, "expected {total} distinct values including zero");
        assert!(seen.contains(&0));
    }

    #[test]
    fn prefixed_generator_preserves_top_bits() {
        let mut rng = Rng::new(5);
        let base = vec![192, 168, 1, 0];
        let mut gen = PrefixedGenerator::new(base.clone(), 24, &mut rng);
        for _ in 0..50 {
            let addr = gen.next();
            assert_eq!(&addr[0..3], &base[0..3]);
        }
    }

    #[test]
    fn mac_generator_avoids_group_bit_when_not_forced() {
        let mut rng = Rng::new(3);
        let mut gen = MacGenerator::new([0x02, 0, 0, 0, 0, 0], 8, &mut rng);
        for _ in 0..200 {
            let mac = gen.next();
            assert_eq!(mac[0] & 1, 0);
        }
    }
}
