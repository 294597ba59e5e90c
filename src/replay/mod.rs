//! The replay engine: reads a pcap file, hash-partitions its packets
//! across output queues, and drives each queue independently through a
//! replicator + rate limiter + output backend for a configured number of
//! loops.

pub mod backend;
pub mod config;
pub mod ingest;
pub mod ratelimiter;
pub mod replicator;

use crate::error::ReplayError;
use backend::{AcquiredBurst, OutputBackend};
use ingest::IngestedPacket;
use ratelimiter::RateLimiter;
use replicator::Replicator;

/// Replays one partitioned queue's packets through one output queue, for
/// `loops` repetitions, rewriting addresses via `replicator` and pacing
/// via `rate_limiter` (mutated per call since the counter-style unit
/// strategies and the bucket both carry state across packets).
pub fn replay_queue(
    packets: &[IngestedPacket],
    replicator: &mut Replicator,
    rate_limiter: &mut RateLimiter,
    backend: &mut dyn OutputBackend,
    queue_id: usize,
    loops: u64,
) -> Result<backend::QueueStats, ReplayError> {
    for loop_index in 0..loops {
        for packet in packets {
            let bytes = rewrite_packet(packet, replicator, loop_index);

            if rate_limiter.mode() == ratelimiter::RateMode::ReplayTime {
                rate_limiter.limit_replay_time(packet.timestamp_ns);
            } else if rate_limiter.mode() == ratelimiter::RateMode::BytesPerSecond {
                rate_limiter.limit(bytes.len() as u64);
            } else {
                rate_limiter.limit(1);
            }

            let queue = backend.get_queue(queue_id)?;
            let granted = queue.acquire(1)?;
            if granted == 0 {
                continue;
            }
            let mut burst = AcquiredBurst::new(queue, granted);
            burst.fill(&bytes);
            burst.commit()?;
        }
    }
    let queue = backend.get_queue(queue_id)?;
    queue.flush()?;
    Ok(queue.stats())
}

/// Rewrites one packet's source/destination IP and MAC fields per the
/// replicator's unit+loop strategies, leaving everything else (ports,
/// payload) untouched.
fn rewrite_packet(packet: &IngestedPacket, replicator: &mut Replicator, loop_index: u64) -> Vec<u8> {
    let mut bytes = packet.bytes.clone();

    if bytes.len() >= 14 {
        let dst_mac = Replicator::rewrite_mac(&replicator.dst_mac, &bytes[0..6].try_into().unwrap());
        let src_mac = Replicator::rewrite_mac(&replicator.src_mac, &bytes[6..12].try_into().unwrap());
        bytes[0..6].copy_from_slice(&dst_mac);
        bytes[6..12].copy_from_slice(&src_mac);
    }

    match packet.l3 {
        ingest::L3Info::V4 { header_offset, .. } if bytes.len() >= header_offset + 20 => {
            let src = Replicator::rewrite_ip(&mut replicator.src_ip, &bytes[header_offset + 12..header_offset + 16], loop_index);
            let dst = Replicator::rewrite_ip(&mut replicator.dst_ip, &bytes[header_offset + 16..header_offset + 20], loop_index);
            bytes[header_offset + 12..header_offset + 16].copy_from_slice(&src);
            bytes[header_offset + 16..header_offset + 20].copy_from_slice(&dst);
        }
        ingest::L3Info::V6 { header_offset, .. } if bytes.len() >= header_offset + 40 => {
            let src = Replicator::rewrite_ip(&mut replicator.src_ip, &bytes[header_offset + 8..header_offset + 24], loop_index);
            let dst = Replicator::rewrite_ip(&mut replicator.dst_ip, &bytes[header_offset + 24..header_offset + 40], loop_index);
            bytes[header_offset + 8..header_offset + 24].copy_from_slice(&src);
            bytes[header_offset + 24..header_offset + 40].copy_from_slice(&dst);
        }
        _ => {}
    }

    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::pcapfile::PcapFileBackend;
    use ratelimiter::RateMode;
    use replicator::{FieldStrategies, UnitStrategy};

    fn ipv4_udp_frame(src: [u8; 4], dst: [u8; 4]) -> IngestedPacket {
        let mut bytes = vec![0u8; 14 + 20 + 8];
        bytes[12] = 0x08;
        bytes[13] = 0x00;
        bytes[14] = 0x45;
        bytes[23] = 17;
        bytes[26..30].copy_from_slice(&src);
        bytes[30..34].copy_from_slice(&dst);
        let (l3, l4_offset) = ingest::classify(&bytes);
        IngestedPacket { bytes, timestamp_ns: 0, l3, l4_offset }
    }

    #[test]
    fn rewrite_applies_unit_strategy_to_src_ip() {
        let packet = ipv4_udp_frame([10, 0, 0, 1], [10, 0, 0, 2]);
        let mut replicator = Replicator {
            src_ip: FieldStrategies { unit: Some(UnitStrategy::AddConstant(1)), loop_strategy: None },
            ..Replicator::default()
        };
        let out = rewrite_packet(&packet, &mut replicator, 0);
        assert_eq!(&out[26..30], &[10, 0, 0, 2]);
    }

    #[test]
    fn replay_queue_writes_every_packet_for_every_loop() {
        let packets = vec![ipv4_udp_frame([10, 0, 0, 1], [10, 0, 0, 2]), ipv4_udp_frame([10, 0, 0, 2], [10, 0, 0, 1])];
        let path = std::env::temp_dir().join(format!("flowforge-replay-queue-test-{}.pcap", std::process::id()));
        let mut backend = PcapFileBackend::create(&path).unwrap();
        let mut replicator = Replicator::new();
        let mut limiter = RateLimiter::new(RateMode::PacketsPerSecond, 1_000_000);
        let stats = replay_queue(&packets, &mut replicator, &mut limiter, &mut backend, 0, 2).unwrap();
        assert_eq!(stats.tx_pkts, 4);
        let _ = std::fs::remove_file(&path);
    }
}
