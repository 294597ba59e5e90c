//! The `Flow` object: a single planned bidirectional conversation.

use crate::layers::{Direction, Layer, LayerOps, PlannedPacket};
use crate::random::Rng;
use crate::sizesolver::{self, DEFAULT_SIZE_TABLE};
use crate::timestamps::plan_timestamps;

/// Layer-3 protocol selector for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L3Proto {
    V4,
    V6,
}

/// Layer-4 protocol selector for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4Proto {
    Tcp,
    Udp,
    IcmpEcho,
    IcmpRandom,
    Icmpv6Echo,
    Icmpv6Random,
}

/// Per-flow knobs that affect planning, threaded in from the generator
/// configuration (see [`crate::config::GeneratorConfig`]).
#[derive(Debug, Clone)]
pub struct FlowPlanningConfig {
    pub max_interpacket_gap_ns: Option<u64>,
    pub fragmentation_probability: f64,
    pub min_packet_size_to_fragment: u64,
    pub enable_http: bool,
    pub enable_dns: bool,
}

impl Default for FlowPlanningConfig {
    fn default() -> Self {
        FlowPlanningConfig {
            max_interpacket_gap_ns: None,
            fragmentation_probability: 0.0,
            min_packet_size_to_fragment: 1500,
            enable_http: true,
            enable_dns: true,
        }
    }
}

/// Assumed Ethernet MTU used by the TCP handshake-fits heuristic and IP
/// fragmentation decisions.
pub const ASSUMED_MTU: u64 = 1500;

/// A single bidirectional conversation: its identity, its targets, its
/// layer stack, and (after planning) its ordered packet list.
#[derive(Debug)]
pub struct Flow {
    pub id: u64,
    pub l3_proto: L3Proto,
    pub l4_proto: L4Proto,
    pub src_ip: Vec<u8>,
    pub dst_ip: Vec<u8>,
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub src_port: u16,
    pub dst_port: u16,

    pub fwd_pkts_target: u64,
    pub rev_pkts_target: u64,
    pub fwd_bytes_target: u64,
    pub rev_bytes_target: u64,

    pub ts_first: u64,
    pub ts_last: u64,

    pub config: FlowPlanningConfig,

    pub layers: Vec<Layer>,
    pub packets: Vec<PlannedPacket>,

    /// Set by the DNS layer's `PostPlanFlow` when a valid DNS exchange
    /// doesn't fit the planned size envelope; Payload then fills those
    /// packets with random bytes instead.
    pub generate_random_payload_instead_of_dns: bool,

    /// Index into `packets` the emission loop has consumed up to.
    pub next_packet_index: usize,

    pub ttl_fwd: u8,
    pub ttl_rev: u8,
    pub ipv4_id_fwd: u16,
    pub ipv4_id_rev: u16,
    pub ipv6_flow_label_fwd: u32,
    pub ipv6_flow_label_rev: u32,
}

impl Flow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        l3_proto: L3Proto,
        l4_proto: L4Proto,
        src_ip: Vec<u8>,
        dst_ip: Vec<u8>,
        src_mac: [u8; 6],
        dst_mac: [u8; 6],
        src_port: u16,
        dst_port: u16,
        fwd_pkts_target: u64,
        rev_pkts_target: u64,
        fwd_bytes_target: u64,
        rev_bytes_target: u64,
        ts_first: u64,
        ts_last: u64,
        config: FlowPlanningConfig,
        rng: &mut Rng,
    ) -> Self {
        Flow {
            id,
            l3_proto,
            l4_proto,
            src_ip,
            dst_ip,
            src_mac,
            dst_mac,
            src_port,
            dst_port,
            fwd_pkts_target,
            rev_pkts_target,
            fwd_bytes_target,
            rev_bytes_target,
            ts_first,
            ts_last,
            config,
            layers: Vec::new(),
            packets: Vec::new(),
            generate_random_payload_instead_of_dns: false,
            next_packet_index: 0,
            ttl_fwd: rng.uniform_range(16, 255) as u8,
            ttl_rev: rng.uniform_range(16, 255) as u8,
            ipv4_id_fwd: 1,
            ipv4_id_rev: 1,
            ipv6_flow_label_fwd: rng.uniform_range(0, (1 << 20) - 1) as u32,
            ipv6_flow_label_rev: rng.uniform_range(0, (1 << 20) - 1) as u32,
        }
    }

    /// Total packets and bytes this flow still needs to plan for, per
    /// direction target.
    pub fn total_pkts_target(&self) -> u64 {
        self.fwd_pkts_target + self.rev_pkts_target
    }

    /// Runs the full plan phase: three passes bottom-to-top over the layer
    /// stack, then direction/timestamp/size solving.
    pub fn plan(&mut self, rng: &mut Rng) {
        // Seed with one packet skeleton per target total packet count,
        // evenly spread across [ts_first, ts_last] for now; the timestamp
        // pass below overwrites these once the final packet count
        // (including fragmentation extras) is known is not possible before
        // PostPlanFlow, so packets inserted there carry their own
        // timestamp derived from their predecessor.
        let total = self.total_pkts_target().max(1) as usize;
        self.packets = (0..total).map(|_| PlannedPacket::new(self.ts_first)).collect();

        let mut layers = std::mem::take(&mut self.layers);
        for layer in layers.iter_mut() {
            layer.plan_flow(self, rng);
        }
        for layer in layers.iter_mut() {
            layer.post_plan_flow(self, rng);
        }
        for layer in layers.iter_mut() {
            layer.plan_extra(self, rng);
        }
        self.layers = layers;

        self.plan_packets_directions(rng);
        self.plan_packets_timestamps(rng);
        self.plan_packets_sizes(rng);
    }

    fn plan_packets_directions(&mut self, rng: &mut Rng) {
        let assigned_fwd = self
            .packets
            .iter()
            .filter(|p| p.direction == Direction::Forward)
            .count() as u64;
        let assigned_rev = self
            .packets
            .iter()
            .filter(|p| p.direction == Direction::Reverse)
            .count() as u64;
        let remaining_fwd = self.fwd_pkts_target.saturating_sub(assigned_fwd);
        let remaining_rev = self.rev_pkts_target.saturating_sub(assigned_rev);

        let mut pool: Vec<Direction> = std::iter::repeat(Direction::Forward)
            .take(remaining_fwd as usize)
            .chain(std::iter::repeat(Direction::Reverse).take(remaining_rev as usize))
            .collect();
        rng.shuffle(&mut pool);
        let mut pool_iter = pool.into_iter();
        for pkt in self.packets.iter_mut() {
            if pkt.direction == Direction::Unknown {
                pkt.direction = pool_iter.next().unwrap_or(Direction::Forward);
            }
        }
    }

    fn plan_packets_timestamps(&mut self, rng: &mut Rng) {
        let n = self.packets.len();
        let ts = plan_timestamps(rng, n, self.ts_first, self.ts_last, self.config.max_interpacket_gap_ns);
        for (pkt, t) in self.packets.iter_mut().zip(ts) {
            pkt.timestamp_ns = t;
        }
    }

    fn plan_packets_sizes(&mut self, rng: &mut Rng) {
        let unfinished: Vec<usize> = self
            .packets
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_finished)
            .map(|(i, _)| i)
            .collect();
        if unfinished.is_empty() {
            return;
        }

        let finished_fwd_bytes: u64 = self
            .packets
            .iter()
            .filter(|p| p.is_finished && p.direction == Direction::Forward)
            .map(|p| p.size)
            .sum();
        let finished_rev_bytes: u64 = self
            .packets
            .iter()
            .filter(|p| p.is_finished && p.direction == Direction::Reverse)
            .map(|p| p.size)
            .sum();

        let fwd_remaining = self.fwd_bytes_target.saturating_sub(finished_fwd_bytes);
        let rev_remaining = self.rev_bytes_target.saturating_sub(finished_rev_bytes);

        let fwd_unfinished: Vec<usize> = unfinished
            .iter()
            .copied()
            .filter(|&i| self.packets[i].direction == Direction::Forward)
            .collect();
        let rev_unfinished: Vec<usize> = unfinished
            .iter()
            .copied()
            .filter(|&i| self.packets[i].direction == Direction::Reverse)
            .collect();

        for (indices, target) in [(fwd_unfinished, fwd_remaining), (rev_unfinished, rev_remaining)] {
            if indices.is_empty() {
                continue;
            }
            let lo = indices
                .iter()
                .map(|&i| self.packets[i].size)
                .max()
                .unwrap_or(0)
                .max(64);
            let sizes = sizesolver::plan_packet_sizes(rng, indices.len(), target.max(lo * indices.len() as u64), DEFAULT_SIZE_TABLE);
            for (&i, s) in indices.iter().zip(sizes) {
                self.packets[i].size = s.max(self.packets[i].size);
            }
        }
    }

    /// Returns the next not-yet-emitted packet's timestamp, if any remain.
    pub fn next_packet_time(&self) -> Option<u64> {
        self.packets.get(self.next_packet_index).map(|p| p.timestamp_ns)
    }

    pub fn has_more_packets(&self) -> bool {
        self.next_packet_index < self.packets.len()
    }
}

/// Tracks assigned-vs-available forward/reverse packet and byte budgets
/// while a layer walks the not-yet-claimed planned packets during
/// `PlanFlow`. Grounded on the reference `FlowPlanHelper`.
pub struct FlowPlanHelper<'a> {
    flow: &'a mut Flow,
    cursor: usize,
    fwd_pkts_remaining: u64,
    rev_pkts_remaining: u64,
    fwd_bytes_remaining: u64,
    rev_bytes_remaining: u64,
}

impl<'a> FlowPlanHelper<'a> {
    pub fn new(flow: &'a mut Flow) -> Self {
        let fwd_pkts_remaining = flow.fwd_pkts_target;
        let rev_pkts_remaining = flow.rev_pkts_target;
        let fwd_bytes_remaining = flow.fwd_bytes_target;
        let rev_bytes_remaining = flow.rev_bytes_target;
        FlowPlanHelper {
            flow,
            cursor: 0,
            fwd_pkts_remaining,
            rev_pkts_remaining,
            fwd_bytes_remaining,
            rev_bytes_remaining,
        }
    }

    pub fn pkts_remaining(&self) -> u64 {
        self.fwd_pkts_remaining + self.rev_pkts_remaining
    }

    pub fn pkts_remaining_dir(&self, dir: Direction) -> u64 {
        match dir {
            Direction::Forward => self.fwd_pkts_remaining,
            Direction::Reverse => self.rev_pkts_remaining,
            Direction::Unknown => 0,
        }
    }

    pub fn fwd_bytes_remaining(&self) -> u64 {
        self.fwd_bytes_remaining
    }
    pub fn rev_bytes_remaining(&self) -> u64 {
        self.rev_bytes_remaining
    }

    /// Returns the index of the next not-yet-claimed packet, without
    /// advancing `cursor` past the end.
    pub fn next_index(&mut self) -> Option<usize> {
        if self.cursor < self.flow.packets.len() {
            let i = self.cursor;
            self.cursor += 1;
            Some(i)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn packet_mut(&mut self, idx: usize) -> &mut PlannedPacket {
        &mut self.flow.packets[idx]
    }

    /// Records that `idx` has been claimed for `dir`, decrementing the
    /// remaining packet/byte budgets.
    pub fn include_pkt(&mut self, idx: usize, dir: Direction) {
        match dir {
            Direction::Forward => {
                self.fwd_pkts_remaining = self.fwd_pkts_remaining.saturating_sub(1);
            }
            Direction::Reverse => {
                self.rev_pkts_remaining = self.rev_pkts_remaining.saturating_sub(1);
            }
            Direction::Unknown => {}
        }
        let size = self.flow.packets[idx].size;
        match dir {
            Direction::Forward => self.fwd_bytes_remaining = self.fwd_bytes_remaining.saturating_sub(size),
            Direction::Reverse => self.rev_bytes_remaining = self.rev_bytes_remaining.saturating_sub(size),
            Direction::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            3,
            3,
            1000,
            1000,
            0,
            10_000_000_000,
            FlowPlanningConfig::default(),
            &mut rng,
        )
    }

    #[test]
    fn new_flow_has_no_packets_until_planned() {
        let flow = make_flow();
        assert!(flow.packets.is_empty());
    }

    #[test]
    fn ttl_is_in_range() {
        let flow = make_flow();
        assert!((16..=255).contains(&flow.ttl_fwd));
        assert!((16..=255).contains(&flow.ttl_rev));
    }
}
