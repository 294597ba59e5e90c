use etherparse::{SlicedPacket, TransportSlice};
use flowforge::addrgen::{MacGenerator, MultiRangeGenerator, PrefixedGenerator};
use flowforge::flow::FlowPlanningConfig;
use flowforge::flowmaker::{AddressPools, FlowMaker};
use flowforge::generator::GeneratorRun;
use flowforge::profile::ProfileRow;
use flowforge::random::Rng;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use std::fs::File;

fn build_pools(seed: u64) -> AddressPools {
    let mut rng = Rng::new(seed);
    AddressPools {
        ipv4: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![10, 0, 0, 0], 8, &mut rng)]),
        ipv6: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![0xfd; 16], 16, &mut rng)]),
        mac: MacGenerator::new([0x02, 0, 0, 0, 0, 0], 16, &mut rng),
    }
}

#[test]
fn generated_pcap_is_parseable_and_has_expected_transport() {
    let rows = vec![ProfileRow {
        start_time_ms: 0,
        end_time_ms: 1_000,
        l3_proto: 4,
        l4_proto: 17,
        src_port: 40_000,
        dst_port: 53,
        packets_fwd: 3,
        bytes_fwd: 300,
        packets_rev: 2,
        bytes_rev: 400,
        src_ip: None,
        dst_ip: None,
    }];

    let seed = 42;
    let flow_maker = FlowMaker::new(seed, build_pools(seed), FlowPlanningConfig::default());
    let path = std::env::temp_dir().join(format!("flowforge-roundtrip-test-{}.pcap", std::process::id()));
    GeneratorRun::new(seed).run(rows, flow_maker, &path, None).unwrap();

    let file = File::open(&path).expect("generated pcap should open");
    let mut reader = LegacyPcapReader::new(65536, file).expect("valid pcap global header");

    let mut packet_count = 0;
    let mut udp_count = 0;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::Legacy(pcap_block) = block {
                    packet_count += 1;
                    if let Ok(eth) = SlicedPacket::from_ethernet(pcap_block.data) {
                        if let Some(TransportSlice::Udp(_)) = eth.transport {
                            udp_count += 1;
                        }
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => reader.refill().expect("refill should succeed"),
            Err(e) => panic!("unexpected pcap read error: {e:?}"),
        }
    }

    assert_eq!(packet_count, 5, "forward + reverse packet counts should sum to 5");
    assert_eq!(udp_count, 5, "every packet in this flow should be UDP");

    let _ = std::fs::remove_file(&path);
}
