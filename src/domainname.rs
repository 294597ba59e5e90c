//! Domain name generator: produces `word-word-…word.tld` strings of an
//! exact requested total length, used by the HTTP and DNS layers.

use crate::random::Rng;

const TLDS: &[&str] = &["com", "net", "org", "io", "info"];
const MAX_LABEL_LEN: usize = 63;
const MIN_TOTAL_LEN: usize = 4;
const MAX_TOTAL_LEN: usize = 255;

fn random_label(rng: &mut Rng, len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..len)
        .map(|_| ALPHABET[rng.uniform_u64(ALPHABET.len() as u64) as usize] as char)
        .collect()
}

/// Generates a domain name of exactly `total_len` characters.
///
/// Shape: one or more dash-joined lowercase/alnum labels (each at most 63
/// characters), followed by a `.` and a TLD. Panics if `total_len` is
/// outside `[4, 255]` or too small to fit a TLD plus separator.
pub fn generate(rng: &mut Rng, total_len: usize) -> String {
    assert!(
        (MIN_TOTAL_LEN..=MAX_TOTAL_LEN).contains(&total_len),
        "domain name length must be in [4, 255]"
    );

    let tld = *rng.choose(TLDS);
    let suffix_len = 1 + tld.len(); // "." + tld
    let label_budget = total_len.saturating_sub(suffix_len).max(1);

    let mut labels: Vec<String> = Vec::new();
    let mut remaining = label_budget;
    while remaining > 0 {
        let is_last = remaining <= MAX_LABEL_LEN;
        let this_len = if is_last {
            remaining
        } else {
            rng.uniform_range(1, MAX_LABEL_LEN as u64) as usize
        };
        labels.push(random_label(rng, this_len.max(1)));
        remaining = remaining.saturating_sub(this_len.max(1));
    }
    if labels.is_empty() {
        labels.push(random_label(rng, 1));
    }

    format!("{}.{}", labels.join("-"), tld)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_length_in_range_is_exact() {
        let mut rng = Rng::new(3);
        for len in 4..=255usize {
            let name = generate(&mut rng, len);
            assert_eq!(name.len(), len, "length mismatch for requested {len}");
            for label in name.trim_end_matches(|c: char| c.is_alphanumeric()).split('.') {
                let _ = label;
            }
        }
    }

    #[test]
    fn labels_never_exceed_63_chars() {
        let mut rng = Rng::new(10);
        let name = generate(&mut rng, 200);
        let host_part = name.rsplit_once('.').unwrap().0;
        for label in host_part.split('-') {
            assert!(label.len() <= 63);
        }
    }
}
