//! Per-flow traffic accounting and the `-r` report CSV writer.

use crate::error::GeneratorError;
use crate::flow::Flow;
use std::path::Path;

/// Running totals for one flow, accumulated as its packets are emitted.
#[derive(Debug, Clone)]
pub struct FlowStats {
    pub src_ip: String,
    pub dst_ip: String,
    pub start_time_ns: u64,
    pub end_time_ns: u64,
    pub start_time_rev_ns: Option<u64>,
    pub end_time_rev_ns: Option<u64>,
    pub l3_proto: &'static str,
    pub l4_proto: &'static str,
    pub src_port: u16,
    pub dst_port: u16,
    pub packets: u64,
    pub bytes: u64,
    pub packets_rev: u64,
    pub bytes_rev: u64,
}

impl FlowStats {
    pub fn new(flow: &Flow, ip_to_string: impl Fn(&[u8]) -> String) -> Self {
        let l3_proto = match flow.l3_proto {
            crate::flow::L3Proto::V4 => "4",
            crate::flow::L3Proto::V6 => "6",
        };
        let l4_proto = match flow.l4_proto {
            crate::flow::L4Proto::Tcp => "6",
            crate::flow::L4Proto::Udp => "17",
            crate::flow::L4Proto::IcmpEcho | crate::flow::L4Proto::IcmpRandom => "1",
            crate::flow::L4Proto::Icmpv6Echo | crate::flow::L4Proto::Icmpv6Random => "58",
        };
        FlowStats {
            src_ip: ip_to_string(&flow.src_ip),
            dst_ip: ip_to_string(&flow.dst_ip),
            start_time_ns: flow.ts_first,
            end_time_ns: flow.ts_first,
            start_time_rev_ns: None,
            end_time_rev_ns: None,
            l3_proto,
            l4_proto,
            src_port: flow.src_port,
            dst_port: flow.dst_port,
            packets: 0,
            bytes: 0,
            packets_rev: 0,
            bytes_rev: 0,
        }
    }

    /// Records one emitted packet of `size` bytes at `timestamp_ns`, in the
    /// given direction.
    pub fn record(&mut self, direction: crate::layers::Direction, timestamp_ns: u64, size: u64) {
        use crate::layers::Direction;
        match direction {
            Direction::Forward | Direction::Unknown => {
                if self.packets == 0 {
                    self.start_time_ns = timestamp_ns;
                }
                self.end_time_ns = timestamp_ns;
                self.packets += 1;
                self.bytes += size;
            }
            Direction::Reverse => {
                if self.packets_rev == 0 {
                    self.start_time_rev_ns = Some(timestamp_ns);
                }
                self.end_time_rev_ns = Some(timestamp_ns);
                self.packets_rev += 1;
                self.bytes_rev += size;
            }
        }
    }
}

/// Accumulates [`FlowStats`] across an entire generator run and writes the
/// `-r` report CSV at the end.
#[derive(Default)]
pub struct TrafficMeter {
    flows: Vec<FlowStats>,
}

impl TrafficMeter {
    pub fn new() -> Self {
        TrafficMeter { flows: Vec::new() }
    }

    pub fn push(&mut self, stats: FlowStats) {
        self.flows.push(stats);
    }

    /// Writes the report CSV with one row per flow, columns matching the
    /// profile input's: `SRC_IP,DST_IP,START_TIME,END_TIME,START_TIME_REV,
    /// END_TIME_REV,L3_PROTO,L4_PROTO,SRC_PORT,DST_PORT,PACKETS,BYTES,
    /// PACKETS_REV,BYTES_REV`.
    pub fn write_report(&self, path: &Path) -> Result<(), GeneratorError> {
        let mut writer = csv::WriterBuilder::new().from_path(path)?;
        writer.write_record([
            "SRC_IP",
            "DST_IP",
            "START_TIME",
            "END_TIME",
            "START_TIME_REV",
            "END_TIME_REV",
            "L3_PROTO",
            "L4_PROTO",
            "SRC_PORT",
            "DST_PORT",
            "PACKETS",
            "BYTES",
            "PACKETS_REV",
            "BYTES_REV",
        ])?;
        for f in &self.flows {
            writer.write_record([
                f.src_ip.clone(),
                f.dst_ip.clone(),
                (f.start_time_ns / 1_000_000).to_string(),
                (f.end_time_ns / 1_000_000).to_string(),
                f.start_time_rev_ns.map(|t| (t / 1_000_000).to_string()).unwrap_or_default(),
                f.end_time_rev_ns.map(|t| (t / 1_000_000).to_string()).unwrap_or_default(),
                f.l3_proto.to_string(),
                f.l4_proto.to_string(),
                f.src_port.to_string(),
                f.dst_port.to_string(),
                f.packets.to_string(),
                f.bytes.to_string(),
                f.packets_rev.to_string(),
                f.bytes_rev.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl From<csv::Error> for GeneratorError {
    fn from(e: csv::Error) -> Self {
        GeneratorError::Config(crate::error::ConfigError::Malformed { source: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowPlanningConfig, L3Proto, L4Proto};
    use crate::layers::Direction;
    use crate::random::Rng;

    fn make_flow() -> Flow {
        let mut rng = Rng::new(1);
        Flow::new(
            1,
            L3Proto::V4,
            L4Proto::Udp,
            vec![10, 0, 0, 1],
            vec![10, 0, 0, 2],
            [0, 1, 2, 3, 4, 5],
            [0, 1, 2, 3, 4, 6],
            1234,
            80,
            2,
            1,
            100,
            50,
            0,
            1_000_000,
            FlowPlanningConfig::default(),
            &mut rng,
        )
    }

    #[test]
    fn records_forward_and_reverse_independently() {
        let flow = make_flow();
        let mut stats = FlowStats::new(&flow, |b| format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3]));
        stats.record(Direction::Forward, 10, 60);
        stats.record(Direction::Reverse, 20, 80);
        stats.record(Direction::Forward, 30, 60);
        assert_eq!(stats.packets, 2);
        assert_eq!(stats.bytes, 120);
        assert_eq!(stats.packets_rev, 1);
        assert_eq!(stats.bytes_rev, 80);
        assert_eq!(stats.start_time_rev_ns, Some(20));
    }

    #[test]
    fn report_writes_header_and_rows() {
        let flow = make_flow();
        let mut meter = TrafficMeter::new();
        let mut stats = FlowStats::new(&flow, |b| format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3]));
        stats.record(Direction::Forward, 0, 64);
        meter.push(stats);

        let dir = std::env::temp_dir().join(format!("flowforge-report-test-{}.csv", std::process::id()));
        meter.write_report(&dir).unwrap();
        let contents = std::fs::read_to_string(&dir).unwrap();
        assert!(contents.starts_with("SRC_IP,DST_IP,START_TIME"));
        assert!(contents.contains("10.0.0.1,10.0.0.2"));
        let _ = std::fs::remove_file(&dir);
    }
}
