use etherparse::SlicedPacket;
use flowforge::replay::backend::pcapfile::PcapFileBackend;
use flowforge::replay::backend::OutputBackend;
use flowforge::replay::config::{parse_replicator_config, OutputSpec};
use flowforge::replay::ingest::read_and_partition;
use flowforge::replay::ratelimiter::{RateLimiter, RateMode};
use flowforge::replay::replay_queue;
use flowforge::{addrgen::{MacGenerator, MultiRangeGenerator, PrefixedGenerator}, flow::FlowPlanningConfig, flowmaker::{AddressPools, FlowMaker}, generator::GeneratorRun, profile::ProfileRow, random::Rng};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use std::fs::File;

fn generate_fixture(path: &std::path::Path) {
    let rows = vec![ProfileRow {
        start_time_ms: 0,
        end_time_ms: 500,
        l3_proto: 4,
        l4_proto: 17,
        src_port: 40_000,
        dst_port: 9_999,
        packets_fwd: 4,
        bytes_fwd: 400,
        packets_rev: 0,
        bytes_rev: 0,
        src_ip: None,
        dst_ip: None,
    }];
    let seed = 7;
    let mut rng = Rng::new(seed);
    let pools = AddressPools {
        ipv4: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![10, 0, 0, 0], 8, &mut rng)]),
        ipv6: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![0xfd; 16], 16, &mut rng)]),
        mac: MacGenerator::new([0x02, 0, 0, 0, 0, 0], 16, &mut rng),
    };
    let flow_maker = FlowMaker::new(seed, pools, FlowPlanningConfig::default());
    GeneratorRun::new(seed).run(rows, flow_maker, path, None).unwrap();
}

fn read_all_src_ips(path: &std::path::Path) -> Vec<[u8; 4]> {
    let file = File::open(path).unwrap();
    let mut reader = LegacyPcapReader::new(65536, file).unwrap();
    let mut out = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::Legacy(b) = block {
                    if let Ok(eth) = SlicedPacket::from_ethernet(b.data) {
                        if let Some(net) = eth.net {
                            if let etherparse::NetSlice::Ipv4(v4) = net {
                                out.push(v4.header().source());
                            }
                        }
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => reader.refill().unwrap(),
            Err(e) => panic!("pcap read error: {e:?}"),
        }
    }
    out
}

/// Generates a tiny capture, replays it through the replicator's
/// `addConstant` strategy into a second pcap file, and checks every source
/// address in the output was shifted by exactly the configured constant.
#[test]
fn replay_with_replicator_config_rewrites_source_addresses() {
    let input = std::env::temp_dir().join(format!("flowforge-replay-pipeline-in-{}.pcap", std::process::id()));
    let output = std::env::temp_dir().join(format!("flowforge-replay-pipeline-out-{}.pcap", std::process::id()));
    generate_fixture(&input);

    let original_src_ips = read_all_src_ips(&input);
    assert!(!original_src_ips.is_empty(), "fixture should contain at least one IPv4 packet");

    let spec = OutputSpec::parse(&format!("pcapFile:path={}", output.display())).unwrap();
    let mut backend = PcapFileBackend::create(std::path::Path::new(spec.get("path").unwrap())).unwrap();
    let queue_count = backend.queue_count().max(1);

    let (queues, _report) = read_and_partition(&input, queue_count).unwrap();

    let mut replicator = parse_replicator_config("units:\n  - srcip: addConstant(1)\n").unwrap();
    let mut limiter = RateLimiter::new(RateMode::PacketsPerSecond, 1_000_000);

    for (queue_id, packets) in queues.iter().enumerate() {
        replay_queue(packets, &mut replicator, &mut limiter, &mut backend, queue_id, 1).unwrap();
    }

    let rewritten_src_ips = read_all_src_ips(&output);
    assert_eq!(rewritten_src_ips.len(), original_src_ips.len());
    for (before, after) in original_src_ips.iter().zip(rewritten_src_ips.iter()) {
        let expected = u32::from_be_bytes(*before).wrapping_add(1).to_be_bytes();
        assert_eq!(*after, expected);
    }

    let _ = std::fs::remove_file(&input);
    let _ = std::fs::remove_file(&output);
}
