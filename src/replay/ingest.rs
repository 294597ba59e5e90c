//! Reads packets from a pcap file, classifies each one down through
//! Ethernet, optional VLAN/MPLS, and L3/L4, and partitions them across
//! output queues with a direction-invariant hash so both halves of a
//! biflow land on the same queue.
//!
//! Classification works on fixed byte offsets rather than a parsing crate:
//! Ethernet/VLAN/MPLS headers are small, fixed-size, and the only thing
//! this needs out of them is "where does L3 start, and is it IPv4 or
//! IPv6" — a byte-offset walk is simpler to get right than pulling in a
//! zero-copy header type for three `u8` reads.

use pcap_parser::{traits::PcapReaderIterator, LegacyPcapReader, PcapBlockOwned, PcapError};
use std::fs::File;
use std::path::Path;

const ETH_HEADER_LEN: usize = 14;

#[derive(Debug, Clone, Copy)]
pub enum L3Info {
    None,
    V4 { header_offset: usize, l4_proto: u8 },
    V6 { header_offset: usize, l4_proto: u8 },
}

/// Classifies one Ethernet frame: strips any VLAN tags, walks any MPLS
/// label stack until the bottom-of-stack bit, then looks for IPv4/IPv6.
/// Returns `L3Info::None` for anything else (ARP, raw MPLS payload it
/// can't interpret, truncated frames) — such packets are still replicated
/// and transmitted, just not hashed by IP.
pub fn classify(bytes: &[u8]) -> (L3Info, Option<usize>) {
    if bytes.len() < ETH_HEADER_LEN {
        return (L3Info::None, None);
    }
    let mut ether_type = u16::from_be_bytes([bytes[12], bytes[13]]);
    let mut offset = ETH_HEADER_LEN;

    loop {
        match ether_type {
            0x8100 | 0x88A8 => {
                if bytes.len() < offset + 4 {
                    return (L3Info::None, None);
                }
                ether_type = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);
                offset += 4;
            }
            0x8847 | 0x8848 => {
                loop {
                    if bytes.len() < offset + 4 {
                        return (L3Info::None, None);
                    }
                    let label_word = u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]);
                    let bottom_of_stack = label_word & 0x100 != 0;
                    offset += 4;
                    if bottom_of_stack {
                        break;
                    }
                }
                if bytes.len() <= offset {
                    return (L3Info::None, None);
                }
                return match bytes[offset] >> 4 {
                    4 => finish_v4(bytes, offset),
                    6 => finish_v6(bytes, offset),
                    _ => (L3Info::None, None),
                };
            }
            0x0800 => return finish_v4(bytes, offset),
            0x86DD => return finish_v6(bytes, offset),
            _ => return (L3Info::None, None),
        }
    }
}

fn finish_v4(bytes: &[u8], offset: usize) -> (L3Info, Option<usize>) {
    if bytes.len() < offset + 20 {
        return (L3Info::None, None);
    }
    let ihl = (bytes[offset] & 0x0F) as usize * 4;
    let l4_proto = bytes[offset + 9];
    let l4_offset = offset + ihl;
    (L3Info::V4 { header_offset: offset, l4_proto }, Some(l4_offset))
}

fn finish_v6(bytes: &[u8], offset: usize) -> (L3Info, Option<usize>) {
    if bytes.len() < offset + 40 {
        return (L3Info::None, None);
    }
    // No extension-header walk: the hash only needs the fixed addresses,
    // which live at a known offset regardless of what follows.
    let l4_proto = bytes[offset + 6];
    (L3Info::V6 { header_offset: offset, l4_proto }, Some(offset + 40))
}

fn ip_bytes<'a>(bytes: &'a [u8], l3: &L3Info) -> Option<(&'a [u8], &'a [u8])> {
    match *l3 {
        L3Info::None => None,
        L3Info::V4 { header_offset, .. } => {
            if bytes.len() < header_offset + 20 {
                return None;
            }
            Some((&bytes[header_offset + 12..header_offset + 16], &bytes[header_offset + 16..header_offset + 20]))
        }
        L3Info::V6 { header_offset, .. } => {
            if bytes.len() < header_offset + 40 {
                return None;
            }
            Some((&bytes[header_offset + 8..header_offset + 24], &bytes[header_offset + 24..header_offset + 40]))
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// `H(srcIP) XOR H(dstIP)`: symmetric under address swap, so both
/// directions of a biflow hash identically.
pub fn direction_invariant_hash(bytes: &[u8], l3: &L3Info) -> u32 {
    match ip_bytes(bytes, l3) {
        Some((src, dst)) => fnv1a(src) ^ fnv1a(dst),
        None => fnv1a(bytes),
    }
}

/// Assigns a packet to one of `queue_count` queues by `hash mod N`.
pub fn partition(hash: u32, queue_count: usize) -> usize {
    if queue_count == 0 {
        return 0;
    }
    (hash as usize) % queue_count
}

/// One ingested packet, classified once up front so the replicator and
/// rate limiter never reparse it.
#[derive(Debug, Clone)]
pub struct IngestedPacket {
    pub bytes: Vec<u8>,
    pub timestamp_ns: u64,
    pub l3: L3Info,
    pub l4_offset: Option<usize>,
}

/// Per-queue packet/byte share, for startup diagnostics ("is this replay
/// balanced across queues").
#[derive(Debug, Clone, Default)]
pub struct PartitionReport {
    pub packets_per_queue: Vec<u64>,
    pub bytes_per_queue: Vec<u64>,
}

impl PartitionReport {
    pub fn new(queue_count: usize) -> Self {
        PartitionReport { packets_per_queue: vec![0; queue_count], bytes_per_queue: vec![0; queue_count] }
    }

    pub fn record(&mut self, queue_id: usize, bytes_len: usize) {
        self.packets_per_queue[queue_id] += 1;
        self.bytes_per_queue[queue_id] += bytes_len as u64;
    }
}

/// Reads every packet out of a classic pcap file up front, classifying and
/// hash-partitioning each one. Replay files are bounded by the
/// generator's own target byte counts, so there's no need for the
/// generator writer's streaming discipline here.
pub fn read_and_partition(path: &Path, queue_count: usize) -> Result<(Vec<Vec<IngestedPacket>>, PartitionReport), std::io::Error> {
    let file = File::open(path)?;
    let mut reader = LegacyPcapReader::new(65536, file)
        .map_err(|e| std::io::Error::other(format!("pcap reader init failed: {e:?}")))?;

    let mut queues: Vec<Vec<IngestedPacket>> = (0..queue_count.max(1)).map(|_| Vec::new()).collect();
    let mut report = PartitionReport::new(queue_count.max(1));

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::Legacy(b) = block {
                    let bytes = b.data.to_vec();
                    let timestamp_ns = b.ts_sec as u64 * 1_000_000_000 + b.ts_usec as u64 * 1000;
                    let (l3, l4_offset) = classify(&bytes);
                    let hash = direction_invariant_hash(&bytes, &l3);
                    let queue_id = partition(hash, queue_count.max(1));
                    report.record(queue_id, bytes.len());
                    queues[queue_id].push(IngestedPacket { bytes, timestamp_ns, l3, l4_offset });
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| std::io::Error::other(format!("pcap refill failed: {e:?}")))?;
            }
            Err(e) => return Err(std::io::Error::other(format!("pcap read error: {e:?}"))),
        }
    }
    Ok((queues, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_udp_frame(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        let mut bytes = vec![0u8; 14 + 20 + 8];
        bytes[12] = 0x08;
        bytes[13] = 0x00;
        bytes[14] = 0x45; // version 4, ihl 5
        bytes[23] = 17; // UDP
        bytes[26..30].copy_from_slice(&src);
        bytes[30..34].copy_from_slice(&dst);
        bytes
    }

    #[test]
    fn classify_finds_ipv4_udp() {
        let bytes = ipv4_udp_frame([10, 0, 0, 1], [10, 0, 0, 2]);
        let (l3, l4_offset) = classify(&bytes);
        assert!(matches!(l3, L3Info::V4 { .. }));
        assert_eq!(l4_offset, Some(34));
    }

    #[test]
    fn hash_is_symmetric_under_address_swap() {
        let fwd = ipv4_udp_frame([10, 0, 0, 1], [10, 0, 0, 2]);
        let rev = ipv4_udp_frame([10, 0, 0, 2], [10, 0, 0, 1]);
        let (l3_fwd, _) = classify(&fwd);
        let (l3_rev, _) = classify(&rev);
        assert_eq!(direction_invariant_hash(&fwd, &l3_fwd), direction_invariant_hash(&rev, &l3_rev));
    }

    #[test]
    fn partition_is_stable_modulo() {
        assert_eq!(partition(7, 4), 3);
        assert_eq!(partition(8, 4), 0);
    }

    #[test]
    fn vlan_tag_is_skipped_before_classification() {
        let mut bytes = vec![0u8; 14 + 4 + 20 + 8];
        bytes[12] = 0x81;
        bytes[13] = 0x00;
        bytes[16] = 0x08;
        bytes[17] = 0x00;
        bytes[18] = 0x45;
        bytes[27] = 17;
        let (l3, l4_offset) = classify(&bytes);
        assert!(matches!(l3, L3Info::V4 { header_offset: 18, .. }));
        assert_eq!(l4_offset, Some(38));
    }
}
