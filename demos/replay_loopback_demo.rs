//! Replays a pcap file out through AF_PACKET on the loopback interface with
//! no address rewriting. Needs `CAP_NET_RAW` (or root) and Linux. Run with:
//!
//!     sudo -E cargo run --example replay_loopback_demo -- /tmp/demo.pcap

#[cfg(target_os = "linux")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use flowforge::replay::backend::afpacket::{AfPacketBackend, AfPacketConfig};
    use flowforge::replay::backend::OutputBackend;
    use flowforge::replay::ingest::read_and_partition;
    use flowforge::replay::ratelimiter::{RateLimiter, RateMode};
    use flowforge::replay::replay_queue;
    use flowforge::replay::replicator::Replicator;

    env_logger::init();

    let input = std::env::args().nth(1).ok_or("usage: replay_loopback_demo <pcap-file>")?;

    let mut backend = AfPacketBackend::open(&AfPacketConfig {
        ifname: "lo".to_string(),
        frame_size: 2048,
        frame_count: 128,
        block_size: 4096,
        qdisc_bypass: false,
        packet_loss: true,
    })?;

    let queue_count = backend.queue_count().max(1);
    let (queues, report) = read_and_partition(std::path::Path::new(&input), queue_count)?;
    for (id, (pkts, bytes)) in report.packets_per_queue.iter().zip(report.bytes_per_queue.iter()).enumerate() {
        println!("queue {id}: {pkts} packets, {bytes} bytes");
    }

    let mut replicator = Replicator::new();
    for (queue_id, packets) in queues.iter().enumerate() {
        let mut limiter = RateLimiter::new(RateMode::PacketsPerSecond, 1_000);
        let stats = replay_queue(packets, &mut replicator, &mut limiter, &mut backend, queue_id, 1)?;
        println!("queue {queue_id}: tx_pkts={} tx_bytes={} failed={}", stats.tx_pkts, stats.tx_bytes, stats.failed_pkts);
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("replay_loopback_demo requires Linux (AF_PACKET)");
}
