//! ICMP / ICMPv6 echo and random-message layers.

use crate::flow::{Flow, FlowPlanHelper};
use crate::layers::{BuildingPacket, Direction, LayerOps, PlannedPacket};
use crate::random::Rng;

const ECHO_HEADER_LEN: u64 = 8;
const MAX_PAYLOAD_SIZE: u64 = 1400;

/// ICMP echo request/reply pair, as generated by `ping`-like traffic.
#[derive(Debug, Clone)]
pub struct IcmpEcho {
    id: u16,
    seq_fwd: u16,
    seq_rev: u16,
}

impl IcmpEcho {
    pub fn new(rng: &mut Rng) -> Self {
        IcmpEcho { id: rng.uniform_u64(u16::MAX as u64) as u16, seq_fwd: 1, seq_rev: 1 }
    }
}

impl LayerOps for IcmpEcho {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        let mut helper = FlowPlanHelper::new(flow);
        let mut dir = Direction::Forward;
        let mut fwd_pkts = 0u64;
        let mut rev_pkts = 0u64;

        while helper.pkts_remaining() > 0 {
            if helper.pkts_remaining_dir(dir) == 0 {
                dir = dir.swap();
            }
            let Some(idx) = helper.next_index() else { break };
            {
                let pkt = helper.packet_mut(idx);
                pkt.direction = dir;
                pkt.size += ECHO_HEADER_LEN;
            }
            match dir {
                Direction::Forward => fwd_pkts += 1,
                Direction::Reverse => rev_pkts += 1,
                Direction::Unknown => {}
            }
            helper.include_pkt(idx, dir);
            dir = dir.swap();
        }

        let fwd_bpp = if fwd_pkts > 0 { helper.fwd_bytes_remaining() / fwd_pkts } else { 0 };
        let rev_bpp = if rev_pkts > 0 { helper.rev_bytes_remaining() / rev_pkts } else { 0 };
        let payload_size = fwd_bpp.max(rev_bpp).min(MAX_PAYLOAD_SIZE);

        helper.reset();
        while let Some(idx) = helper.next_index() {
            let pkt = helper.packet_mut(idx);
            pkt.is_finished = true;
            pkt.size += payload_size;
        }
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        planned.size = planned.size.saturating_sub(ECHO_HEADER_LEN);
        let data = rng.random_bytes(planned.size as usize);
        planned.size = 0;

        let (msg_type, seq) = match planned.direction {
            Direction::Forward | Direction::Unknown => {
                let s = self.seq_fwd;
                self.seq_fwd += 1;
                (8u8, s) // echo request
            }
            Direction::Reverse => {
                let s = self.seq_rev;
                self.seq_rev += 1;
                (0u8, s) // echo reply
            }
        };

        let mut header = vec![msg_type, 0, 0, 0];
        header.extend_from_slice(&self.id.to_be_bytes());
        header.extend_from_slice(&seq.to_be_bytes());
        header.extend_from_slice(&data);
        pkt.append(&header);
    }
}

/// ICMP error-style random-message layer (destination unreachable family),
/// used for flows that model incidental ICMP rather than active pings.
#[derive(Debug, Clone)]
pub struct IcmpRandom {
    code: u8,
}

impl IcmpRandom {
    pub fn new(rng: &mut Rng) -> Self {
        const CODES: [u8; 6] = [0, 1, 2, 3, 4, 13];
        IcmpRandom { code: *rng.choose(&CODES) }
    }
}

impl LayerOps for IcmpRandom {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        for pkt in flow.packets.iter_mut() {
            pkt.size += ECHO_HEADER_LEN;
            pkt.is_finished = true;
        }
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        planned.size = planned.size.saturating_sub(ECHO_HEADER_LEN);
        let data = rng.random_bytes(planned.size as usize);
        planned.size = 0;
        let mut header = vec![3u8, self.code, 0, 0, 0, 0, 0, 0];
        header.extend_from_slice(&data);
        pkt.append(&header);
    }
}

/// ICMPv6 echo request/reply pair.
#[derive(Debug, Clone)]
pub struct Icmpv6Echo {
    id: u16,
    seq_fwd: u16,
    seq_rev: u16,
}

impl Icmpv6Echo {
    pub fn new(rng: &mut Rng) -> Self {
        Icmpv6Echo { id: rng.uniform_u64(u16::MAX as u64) as u16, seq_fwd: 1, seq_rev: 1 }
    }
}

impl LayerOps for Icmpv6Echo {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        let mut helper = FlowPlanHelper::new(flow);
        let mut dir = Direction::Forward;
        while helper.pkts_remaining() > 0 {
            if helper.pkts_remaining_dir(dir) == 0 {
                dir = dir.swap();
            }
            let Some(idx) = helper.next_index() else { break };
            {
                let pkt = helper.packet_mut(idx);
                pkt.direction = dir;
                pkt.size += ECHO_HEADER_LEN;
                pkt.is_finished = true;
            }
            helper.include_pkt(idx, dir);
            dir = dir.swap();
        }
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        planned.size = planned.size.saturating_sub(ECHO_HEADER_LEN);
        let data = rng.random_bytes(planned.size as usize);
        planned.size = 0;
        let (msg_type, seq) = match planned.direction {
            Direction::Forward | Direction::Unknown => {
                let s = self.seq_fwd;
                self.seq_fwd += 1;
                (128u8, s)
            }
            Direction::Reverse => {
                let s = self.seq_rev;
                self.seq_rev += 1;
                (129u8, s)
            }
        };
        let mut header = vec![msg_type, 0, 0, 0];
        header.extend_from_slice(&self.id.to_be_bytes());
        header.extend_from_slice(&seq.to_be_bytes());
        header.extend_from_slice(&data);
        pkt.append(&header);
    }
}

/// ICMPv6 destination-unreachable-style random message layer.
#[derive(Debug, Clone)]
pub struct Icmpv6Random {
    code: u8,
}

impl Icmpv6Random {
    pub fn new(rng: &mut Rng) -> Self {
        const CODES: [u8; 9] = [0, 1, 2, 3, 4, 5, 6, 7, 8];
        Icmpv6Random { code: *rng.choose(&CODES) }
    }
}

impl LayerOps for Icmpv6Random {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        for pkt in flow.packets.iter_mut() {
            pkt.size += ECHO_HEADER_LEN;
            pkt.is_finished = true;
        }
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        planned.size = planned.size.saturating_sub(ECHO_HEADER_LEN);
        let data = rng.random_bytes(planned.size as usize);
        planned.size = 0;
        let mut header = vec![1u8, self.code, 0, 0, 0, 0, 0, 0];
        header.extend_from_slice(&data);
        pkt.append(&header);
    }
}
