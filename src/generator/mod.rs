//! The generator's main loop: drains profile rows through [`FlowMaker`],
//! admits planned flows into the [`Calendar`], and emits packets in
//! timestamp order to a pcap file while [`TrafficMeter`] tallies stats.

pub mod pcap;

use crate::calendar::Calendar;
use crate::error::GeneratorError;
use crate::flow::Flow;
use crate::flowmaker::FlowMaker;
use crate::layers::{BuildingPacket, PlannedPacket};
use crate::profile::ProfileRow;
use crate::random::Rng;
use crate::trafficmeter::{FlowStats, TrafficMeter};
use std::collections::VecDeque;
use std::path::Path;

fn ip_to_string(bytes: &[u8]) -> String {
    match bytes.len() {
        4 => format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3]),
        16 => {
            let groups: Vec<String> = bytes.chunks(2).map(|c| format!("{:02x}{:02x}", c[0], c[1])).collect();
            groups.join(":")
        }
        _ => "0.0.0.0".to_string(),
    }
}

/// Builds one concrete packet's bytes by running every layer's `Build` then
/// `PostBuild`, bottom-to-top (Ethernet first, so the stack order matches
/// the stack itself).
fn build_packet(flow: &mut Flow, packet_idx: usize, rng: &mut Rng) -> (Vec<u8>, Vec<Vec<u8>>) {
    let mut building = BuildingPacket::default();
    let mut planned: PlannedPacket = flow.packets[packet_idx].clone();

    let mut layers = std::mem::take(&mut flow.layers);
    for layer in layers.iter_mut() {
        layer.build(&mut building, &mut planned, rng);
    }
    for layer in layers.iter_mut().rev() {
        layer.post_build(&mut building, &mut planned);
    }
    flow.layers = layers;

    (building.bytes, building.extra_fragments)
}

/// Runs the end-to-end generator pipeline: profiles in, pcap (plus optional
/// report CSV) out.
pub struct GeneratorRun {
    pub global_seed: u64,
}

impl GeneratorRun {
    pub fn new(global_seed: u64) -> Self {
        GeneratorRun { global_seed }
    }

    pub fn run(
        &self,
        rows: Vec<ProfileRow>,
        mut flow_maker: FlowMaker,
        pcap_path: &Path,
        report_path: Option<&Path>,
    ) -> Result<(), GeneratorError> {
        let mut writer = pcap::PcapWriter::create(pcap_path)?;
        let mut meter = TrafficMeter::new();

        let mut pending: VecDeque<Flow> = VecDeque::new();
        flow_maker.run(rows, |flow| pending.push_back(flow))?;

        let mut calendar = Calendar::new();
        let mut stats_by_flow: Vec<FlowStats> = Vec::new();
        let mut stats_index: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();

        for flow in pending.drain(..) {
            let stats = FlowStats::new(&flow, ip_to_string);
            stats_index.insert(flow.id, stats_by_flow.len());
            stats_by_flow.push(stats);
            calendar.push(flow);
        }

        let mut pending_extra_fragments: VecDeque<(u64, Vec<u8>)> = VecDeque::new();

        while !calendar.is_empty() || !pending_extra_fragments.is_empty() {
            if let Some((_flow_id, bytes)) = pending_extra_fragments.pop_front() {
                writer.write_packet(0, &bytes)?;
                continue;
            }

            let mut flow = match calendar.pop() {
                Some(f) => f,
                None => break,
            };

            let idx = flow.next_packet_index;
            let timestamp_ns = flow.packets[idx].timestamp_ns;
            let direction = flow.packets[idx].direction;
            let planned_size_before = flow.packets[idx].size;

            // Each packet's build-time draws (payload fill, DNS/HTTP filler)
            // come from an independent stream keyed by (flow id, packet
            // index), so emission order never perturbs another packet's
            // bytes and no RNG state needs to survive a calendar push/pop.
            let per_packet_seed = self.global_seed ^ flow.id ^ (idx as u64).wrapping_mul(0x9E3779B97F4A7C15);
            let mut rng = Rng::new(per_packet_seed);

            let (bytes, extras) = build_packet(&mut flow, idx, &mut rng);
            writer.write_packet(timestamp_ns, &bytes)?;
            for extra in extras {
                pending_extra_fragments.push_back((flow.id, extra));
            }

            if let Some(&stat_idx) = stats_index.get(&flow.id) {
                stats_by_flow[stat_idx].record(direction, timestamp_ns, planned_size_before.max(bytes.len() as u64));
            }

            flow.next_packet_index += 1;
            if flow.has_more_packets() {
                calendar.push(flow);
            }
        }

        for stats in stats_by_flow {
            meter.push(stats);
        }
        if let Some(path) = report_path {
            meter.write_report(path)?;
        }
        writer.flush()?;
        Ok(())
    }
}
