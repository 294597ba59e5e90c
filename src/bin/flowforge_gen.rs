//! `flowforge-gen`: turns a profile CSV (plus optional YAML config) into a
//! pcap file and an optional per-flow report CSV.

use clap::Parser;
use flowforge::addrgen::{MacGenerator, MultiRangeGenerator, PrefixedGenerator};
use flowforge::config::{AddressRangeConfig, GeneratorConfigFile};
use flowforge::flow::FlowPlanningConfig;
use flowforge::flowmaker::{AddressPools, FlowMaker};
use flowforge::generator::GeneratorRun;
use flowforge::profile::load_profiles;
use flowforge::random::Rng;
use std::path::PathBuf;
use std::process::ExitCode;

/// Synthesizes network traffic matching per-flow statistical profiles.
#[derive(Parser, Debug)]
#[command(name = "flowforge-gen", version)]
struct Args {
    /// Input profile CSV.
    #[arg(short = 'p', long = "profiles")]
    profiles: PathBuf,

    /// Output pcap file.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Optional generator YAML config.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Optional per-flow report CSV.
    #[arg(short = 'r', long = "report")]
    report: Option<PathBuf>,

    /// Increase log verbosity; repeatable.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Deterministic global seed; a random one is drawn if omitted.
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Skip profile rows this build doesn't know how to synthesize instead
    /// of failing the whole run.
    #[arg(long = "skip-unknown")]
    skip_unknown: bool,

    /// Skip the output-path free-space check.
    #[arg(long = "no-diskspace-check")]
    no_diskspace_check: bool,

    /// Skip 5-tuple collision checking (accept duplicate tuples).
    #[arg(long = "no-collision-check")]
    no_collision_check: bool,
}

fn parse_prefixed(range: &str) -> Option<(Vec<u8>, u8)> {
    let (addr, prefix) = range.split_once('/')?;
    let prefix: u8 = prefix.trim().parse().ok()?;
    if let Ok(v4) = addr.trim().parse::<std::net::Ipv4Addr>() {
        return Some((v4.octets().to_vec(), prefix));
    }
    if let Ok(v6) = addr.trim().parse::<std::net::Ipv6Addr>() {
        return Some((v6.octets().to_vec(), prefix));
    }
    None
}

fn parse_mac_prefixed(range: &str) -> Option<([u8; 6], u8)> {
    let (addr, prefix) = range.split_once('/')?;
    let prefix: u8 = prefix.trim().parse().ok()?;
    let octets: Vec<&str> = addr.trim().split(':').collect();
    if octets.len() != 6 {
        return None;
    }
    let mut mac = [0u8; 6];
    for (i, o) in octets.iter().enumerate() {
        mac[i] = u8::from_str_radix(o, 16).ok()?;
    }
    Some((mac, prefix))
}

fn build_pools(config: &GeneratorConfigFile, rng: &mut Rng) -> AddressPools {
    let ipv4_ranges: Vec<PrefixedGenerator> = parse_ranges(&config.ipv4, rng, [10, 0, 0, 0].to_vec(), 8);
    let ipv6_ranges: Vec<PrefixedGenerator> = parse_ranges(&config.ipv6, rng, vec![0xfd; 16], 16);

    let mac = match config.mac.mac_range.as_deref().and_then(parse_mac_prefixed) {
        Some((base, prefix)) => MacGenerator::new(base, prefix, rng),
        None => MacGenerator::new([0x02, 0, 0, 0, 0, 0], 16, rng),
    };

    AddressPools {
        ipv4: MultiRangeGenerator::new(ipv4_ranges),
        ipv6: MultiRangeGenerator::new(ipv6_ranges),
        mac,
    }
}

fn parse_ranges(range: &AddressRangeConfig, rng: &mut Rng, default_base: Vec<u8>, default_prefix: u8) -> Vec<PrefixedGenerator> {
    match range.ip_range.as_deref().and_then(parse_prefixed) {
        Some((base, prefix)) => vec![PrefixedGenerator::new(base, prefix, rng)],
        None => vec![PrefixedGenerator::new(default_base, default_prefix, rng)],
    }
}

fn build_planning_config(config: &GeneratorConfigFile) -> FlowPlanningConfig {
    let fragmentation_probability = config.fragmentation_probability.map(|p| p.0).unwrap_or(0.0);
    let min_packet_size_to_fragment = config.min_packet_size_to_fragment.unwrap_or(u64::MAX);
    let enabled: Vec<String> = config.payload.enabled_protocols.iter().map(|s| s.to_lowercase()).collect();
    FlowPlanningConfig {
        max_interpacket_gap_ns: config.timestamps.flow_max_interpacket_gap_ns(),
        fragmentation_probability,
        min_packet_size_to_fragment,
        enable_http: enabled.iter().any(|p| p == "http"),
        enable_dns: enabled.iter().any(|p| p == "dns"),
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if !args.no_diskspace_check {
        if let Some(parent) = args.output.parent() {
            if parent.as_os_str().is_empty() || !parent.exists() {
                log::warn!("output directory '{}' does not exist yet; the write will create it if possible", parent.display());
            }
        }
    }

    let config = match &args.config {
        Some(path) => flowforge::config::load_config(path)?,
        None => GeneratorConfigFile::default(),
    };

    let mut rows = load_profiles(&args.profiles)?;
    if args.skip_unknown {
        rows.retain(|r| matches!(r.l4_proto, 1 | 6 | 17 | 58));
    }

    let seed = args.seed.unwrap_or_else(|| {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0x9E37_79B9)
    });

    let mut pool_rng = Rng::new(seed);
    let pools = build_pools(&config, &mut pool_rng);
    let planning_config = build_planning_config(&config);

    let mut flow_maker = FlowMaker::new(seed, pools, planning_config);
    if args.no_collision_check {
        log::warn!("collision checking disabled via --no-collision-check; duplicate 5-tuples may appear");
        flow_maker = flow_maker.without_collision_check();
    }

    let run = GeneratorRun::new(seed);
    run.run(rows, flow_maker, &args.output, args.report.as_deref())?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
