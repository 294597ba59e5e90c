//! Builds a handful of profile rows in-process and writes them straight to
//! a pcap file, skipping the CSV step. Run with:
//!
//!     cargo run --example generate_demo -- /tmp/demo.pcap

use flowforge::addrgen::{MacGenerator, MultiRangeGenerator, PrefixedGenerator};
use flowforge::flow::FlowPlanningConfig;
use flowforge::flowmaker::{AddressPools, FlowMaker};
use flowforge::generator::GeneratorRun;
use flowforge::profile::ProfileRow;
use flowforge::random::Rng;
use std::path::PathBuf;

fn demo_rows() -> Vec<ProfileRow> {
    vec![
        ProfileRow {
            start_time_ms: 0,
            end_time_ms: 2_000,
            l3_proto: 4,
            l4_proto: 6,
            src_port: 51_000,
            dst_port: 443,
            packets_fwd: 12,
            bytes_fwd: 9_000,
            packets_rev: 10,
            bytes_rev: 14_000,
            src_ip: None,
            dst_ip: None,
        },
        ProfileRow {
            start_time_ms: 500,
            end_time_ms: 800,
            l3_proto: 4,
            l4_proto: 17,
            src_port: 33_000,
            dst_port: 53,
            packets_fwd: 1,
            bytes_fwd: 64,
            packets_rev: 1,
            bytes_rev: 128,
            src_ip: None,
            dst_ip: None,
        },
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let output: PathBuf = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("demo.pcap"));

    let seed = 0x1234_5678_9abc_def0;
    let mut rng = Rng::new(seed);
    let pools = AddressPools {
        ipv4: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![10, 0, 0, 0], 8, &mut rng)]),
        ipv6: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![0xfd; 16], 16, &mut rng)]),
        mac: MacGenerator::new([0x02, 0, 0, 0, 0, 0], 16, &mut rng),
    };

    let flow_maker = FlowMaker::new(seed, pools, FlowPlanningConfig::default());
    let run = GeneratorRun::new(seed);
    run.run(demo_rows(), flow_maker, &output, None)?;

    println!("wrote {}", output.display());
    Ok(())
}
