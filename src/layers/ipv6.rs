//! IPv6 layer: address assignment, flow label, and probabilistic
//! per-packet fragmentation via an explicit Fragment Extension Header.

use crate::flow::Flow;
use crate::layers::{BuildingPacket, Direction, LayerOps, PlannedPacket};
use crate::random::Rng;

pub const HEADER_LEN: u64 = 40;
pub const FRAGMENT_EXT_HEADER_LEN: u64 = 8;
const NEXT_HEADER_FRAGMENT: u8 = 44;

#[derive(Debug, Clone)]
pub struct Ipv6 {
    pub src: [u8; 16],
    pub dst: [u8; 16],
    pub next_header: u8,
    flow_label_fwd: u32,
    flow_label_rev: u32,
}

impl Ipv6 {
    pub fn new(src: [u8; 16], dst: [u8; 16], next_header: u8) -> Self {
        Ipv6 { src, dst, next_header, flow_label_fwd: 0, flow_label_rev: 0 }
    }
}

impl LayerOps for Ipv6 {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        self.flow_label_fwd = flow.ipv6_flow_label_fwd;
        self.flow_label_rev = flow.ipv6_flow_label_rev;
        for pkt in flow.packets.iter_mut() {
            pkt.size += HEADER_LEN;
        }
    }

    fn post_plan_flow(&mut self, flow: &mut Flow, rng: &mut Rng) {
        let prob = flow.config.fragmentation_probability;
        if prob <= 0.0 {
            return;
        }
        let min_size = flow.config.min_packet_size_to_fragment;
        let mut insertions = Vec::new();
        for (i, pkt) in flow.packets.iter().enumerate() {
            if pkt.is_finished || pkt.is_extra {
                continue;
            }
            if pkt.size < min_size {
                continue;
            }
            if rng.uniform_f64() < prob {
                insertions.push(i);
            }
        }
        for &i in insertions.iter().rev() {
            flow.packets[i].params.fragment_count = Some(2);
            flow.packets[i].size += FRAGMENT_EXT_HEADER_LEN;
            let mut extra = PlannedPacket::new(flow.packets[i].timestamp_ns);
            extra.is_extra = true;
            extra.direction = flow.packets[i].direction;
            flow.packets.insert(i + 1, extra);
        }
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, _rng: &mut Rng) {
        if planned.is_extra {
            return;
        }
        pkt.ip_header_offset = pkt.bytes.len();
        let will_fragment = planned.params.fragment_count.is_some();
        planned.size = planned
            .size
            .saturating_sub(HEADER_LEN)
            .saturating_sub(if will_fragment { FRAGMENT_EXT_HEADER_LEN } else { 0 });

        let (src, dst, flow_label) = match planned.direction {
            Direction::Reverse => (self.dst, self.src, self.flow_label_rev),
            _ => (self.src, self.dst, self.flow_label_fwd),
        };

        let mut header = [0u8; 40];
        header[0] = 0x60; // version 6
        header[1] = (flow_label >> 16) as u8 & 0x0F;
        header[2..4].copy_from_slice(&((flow_label & 0xFFFF) as u16).to_be_bytes());
        header[6] = if will_fragment { NEXT_HEADER_FRAGMENT } else { self.next_header };
        header[7] = 64; // hop limit
        header[8..24].copy_from_slice(&src);
        header[24..40].copy_from_slice(&dst);
        pkt.append(&header);

        if will_fragment {
            // Fragment header placeholder; PostBuild rewrites offset/M bits
            // once the final fragments are known.
            let frag_hdr = [self.next_header, 0, 0, 0, 0, 0, 0, 0];
            pkt.append(&frag_hdr);
        }
    }

    fn post_build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket) {
        if planned.is_extra {
            return;
        }
        let offset = pkt.ip_header_offset;
        let will_fragment = planned.params.fragment_count.is_some();
        let payload_start = offset + 40 + if will_fragment { 8 } else { 0 };
        let payload_len = (pkt.bytes.len() - payload_start) as u16;
        pkt.bytes[offset + 4..offset + 6].copy_from_slice(&payload_len.to_be_bytes());

        if !will_fragment {
            return;
        }

        let prefix = pkt.bytes[..offset].to_vec();
        let base_header = pkt.bytes[offset..offset + 40].to_vec();
        let next_header_for_fragment = pkt.bytes[offset + 40];
        let payload = pkt.bytes[payload_start..].to_vec();

        let frag_payload_len = ((payload.len() / 2 + 7) / 8 * 8).max(8).min(payload.len().max(1));
        let mut fragments: Vec<(u16, bool, Vec<u8>)> = Vec::new();
        let mut remaining = payload.as_slice();
        let mut frag_offset_units: u16 = 0;
        while !remaining.is_empty() {
            let take = frag_payload_len.min(remaining.len());
            let (chunk, rest) = remaining.split_at(take);
            let more = !rest.is_empty();
            fragments.push((frag_offset_units, more, chunk.to_vec()));
            frag_offset_units += (take / 8) as u16;
            remaining = rest;
        }
        if fragments.is_empty() {
            return;
        }

        let ident: u32 = 0xACE1_0001;
        let build_fragment = |frag_off: u16, more: bool, data: &[u8]| -> Vec<u8> {
            let mut h = base_header.clone();
            let payload_len = (8 + data.len()) as u16;
            h[4..6].copy_from_slice(&payload_len.to_be_bytes());
            h[6] = NEXT_HEADER_FRAGMENT;
            let mut frag_hdr = [0u8; 8];
            frag_hdr[0] = next_header_for_fragment;
            let offset_and_m = (frag_off << 3) | if more { 1 } else { 0 };
            frag_hdr[2..4].copy_from_slice(&offset_and_m.to_be_bytes());
            frag_hdr[4..8].copy_from_slice(&ident.to_be_bytes());
            let mut out = prefix.clone();
            out.extend_from_slice(&h);
            out.extend_from_slice(&frag_hdr);
            out.extend_from_slice(data);
            out
        };

        let (first_off, first_more, first_data) = &fragments[0];
        pkt.bytes = build_fragment(*first_off, *first_more, first_data);

        for (off, more, data) in &fragments[1..] {
            pkt.extra_fragments.push(build_fragment(*off, *more, data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_forty_byte_header() {
        let mut ip = Ipv6::new([0; 16], [1; 16], 17);
        let mut pkt = BuildingPacket::default();
        let mut planned = PlannedPacket::new(0);
        planned.size = 48;
        let mut rng = Rng::new(1);
        ip.build(&mut pkt, &mut planned, &mut rng);
        assert_eq!(pkt.bytes.len(), 40);
        assert_eq!(planned.size, 8);
    }
}
