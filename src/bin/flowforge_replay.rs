//! `flowforge-replay`: reads a pcap file, hash-partitions it across one
//! output queue per worker, and replays it through a pluggable transmit
//! backend with replication and rate limiting applied per loop.

use clap::Parser;
use flowforge::replay::backend::pcapfile::PcapFileBackend;
use flowforge::replay::backend::OutputBackend;
use flowforge::replay::config::{load_replicator_config, validate_plugin_name, OutputSpec};
use flowforge::replay::ingest::read_and_partition;
use flowforge::replay::ratelimiter::{RateLimiter, RateMode};
use flowforge::replay::replicator::Replicator;
use flowforge::replay::replay_queue;
use std::path::PathBuf;
use std::process::ExitCode;

/// Replays a captured pcap file through a transmit backend.
#[derive(Parser, Debug)]
#[command(name = "flowforge-replay", version)]
struct Args {
    /// Replicator YAML config (`units:`/`loop:` sections).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Output plugin spec: `pluginName:key=v,key=v,...`.
    #[arg(short = 'o', long = "output")]
    output: String,

    /// Input pcap file.
    #[arg(short = 'p', long = "pcap")]
    pcap: PathBuf,

    /// Rate multiplier: pps/bps target, or replay-time speedup factor.
    #[arg(short = 'r', long = "rate")]
    rate: Option<f64>,

    /// Increase log verbosity; repeatable.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Number of times to replay the file.
    #[arg(short = 'l', long = "loops", default_value_t = 1)]
    loops: u64,
}

fn open_backend(spec: &OutputSpec) -> Result<Box<dyn OutputBackend>, Box<dyn std::error::Error>> {
    validate_plugin_name(&spec.plugin)?;
    match spec.plugin.as_str() {
        "pcapFile" => {
            let path = spec.get("path").unwrap_or("replay-out.pcap");
            Ok(Box::new(PcapFileBackend::create(std::path::Path::new(path))?))
        }
        "raw" => {
            #[cfg(target_os = "linux")]
            {
                use flowforge::replay::backend::rawsocket::RawSocketBackend;
                let ifc = spec.get("ifc").ok_or("raw plugin requires ifc=<interface>")?;
                Ok(Box::new(RawSocketBackend::open(ifc)?))
            }
            #[cfg(not(target_os = "linux"))]
            {
                Err("the raw socket plugin is only available on Linux".into())
            }
        }
        "packet" => {
            #[cfg(target_os = "linux")]
            {
                use flowforge::replay::backend::afpacket::{AfPacketBackend, AfPacketConfig};
                let ifc = spec.get("ifc").ok_or("packet plugin requires ifc=<interface>")?;
                let config = AfPacketConfig {
                    ifname: ifc.to_string(),
                    frame_size: spec.get_u32("frameSize").unwrap_or(2048),
                    frame_count: spec.get_u32("frameCount").unwrap_or(128),
                    block_size: spec.get_u32("blockSize").unwrap_or(4096),
                    qdisc_bypass: spec.get_bool("qdiskBypass"),
                    packet_loss: spec.get_bool("packetLoss"),
                };
                Ok(Box::new(AfPacketBackend::open(&config)?))
            }
            #[cfg(not(target_os = "linux"))]
            {
                Err("the AF_PACKET plugin is only available on Linux".into())
            }
        }
        "xdp" => {
            #[cfg(target_os = "linux")]
            {
                use flowforge::replay::backend::afxdp::{AfXdpBackend, AfXdpConfig, XdpMode};
                let ifc = spec.get("ifc").ok_or("xdp plugin requires ifc=<interface>")?;
                let config = AfXdpConfig {
                    ifname: ifc.to_string(),
                    queue_id: spec.get_u32("queueId").unwrap_or(0),
                    umem_size: spec.get_u32("umemSize").unwrap_or(256),
                    packet_size: spec.get_u32("packetSize").unwrap_or(2048),
                    xsk_queue_size: spec.get_u32("xskQueueSize").unwrap_or(256),
                    zero_copy: spec.get_bool("zeroCopy"),
                    mode: if spec.get_bool("nativeMode") { XdpMode::Drv } else { XdpMode::Skb },
                };
                Ok(Box::new(AfXdpBackend::open(&config)?))
            }
            #[cfg(not(target_os = "linux"))]
            {
                Err("AF_XDP is only available on Linux".into())
            }
        }
        "dpdk" => {
            use flowforge::replay::backend::dpdk::DpdkBackend;
            let port_id: u16 = spec.get_u32("portId").unwrap_or(0) as u16;
            Ok(Box::new(DpdkBackend::open(port_id)?))
        }
        "nfb" => {
            use flowforge::replay::backend::nfb::NfbBackend;
            let device = spec.get("device").unwrap_or("/dev/nfb0");
            Ok(Box::new(NfbBackend::open(device)?))
        }
        other => Err(format!("unhandled plugin '{other}'").into()),
    }
}

fn rate_limiter_from_args(rate: Option<f64>) -> RateLimiter {
    match rate {
        Some(r) if r > 0.0 => RateLimiter::new(RateMode::PacketsPerSecond, r as u64),
        _ => RateLimiter::new(RateMode::ReplayTime, 1),
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let spec = OutputSpec::parse(&args.output)?;
    let mut replicator = match &args.config {
        Some(path) => load_replicator_config(path)?,
        None => Replicator::new(),
    };

    let mut backend = open_backend(&spec)?;
    let queue_count = backend.queue_count().max(1);

    let (queues, report) = read_and_partition(&args.pcap, queue_count)?;
    for (id, (pkts, bytes)) in report.packets_per_queue.iter().zip(report.bytes_per_queue.iter()).enumerate() {
        log::info!("queue {id}: {pkts} packets, {bytes} bytes");
    }

    for (queue_id, packets) in queues.iter().enumerate() {
        let mut limiter = rate_limiter_from_args(args.rate);
        let stats = replay_queue(packets, &mut replicator, &mut limiter, backend.as_mut(), queue_id, args.loops)?;
        log::info!(
            "queue {queue_id}: tx_pkts={} tx_bytes={} failed={}",
            stats.tx_pkts,
            stats.tx_bytes,
            stats.failed_pkts
        );
    }
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
