//! IPv4 layer: address assignment, TTL, monotonic IP ID, and probabilistic
//! per-packet fragmentation.

use crate::flow::Flow;
use crate::layers::{BuildingPacket, Direction, LayerOps, PlannedPacket};
use crate::random::Rng;

pub const HEADER_LEN: u64 = 20;

#[derive(Debug, Clone)]
pub struct Ipv4 {
    pub src: [u8; 4],
    pub dst: [u8; 4],
    pub protocol: u8,
    ttl_fwd: u8,
    ttl_rev: u8,
    id_fwd: u16,
    id_rev: u16,
}

impl Ipv4 {
    pub fn new(src: [u8; 4], dst: [u8; 4], protocol: u8) -> Self {
        Ipv4 { src, dst, protocol, ttl_fwd: 64, ttl_rev: 64, id_fwd: 1, id_rev: 1 }
    }

    fn checksum(header: &[u8]) -> u16 {
        let mut sum: u32 = 0;
        for chunk in header.chunks(2) {
            let word = if chunk.len() == 2 {
                u16::from_be_bytes([chunk[0], chunk[1]])
            } else {
                u16::from_be_bytes([chunk[0], 0])
            };
            sum += word as u32;
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        !(sum as u16)
    }
}

impl LayerOps for Ipv4 {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        self.ttl_fwd = flow.ttl_fwd;
        self.ttl_rev = flow.ttl_rev;
        self.id_fwd = flow.ipv4_id_fwd;
        self.id_rev = flow.ipv4_id_rev;
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
        // Insert extras after their trigger packet, highest index first so
        // earlier indices stay valid.
        for &i in insertions.iter().rev() {
            flow.packets[i].params.fragment_count = Some(2);
            let mut extra = PlannedPacket::new(flow.packets[i].timestamp_ns);
            extra.is_extra = true;
            extra.direction = flow.packets[i].direction;
            flow.packets.insert(i + 1, extra);
        }
    }

    fn plan_extra(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        // The extra fragment packet carries no additional header
        // contribution of its own; IPv4's PostBuild splices bytes directly
        // from the original packet's build, so nothing to do here beyond
        // what PostPlanFlow already set up.
        let _ = flow;
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, _rng: &mut Rng) {
        if planned.is_extra {
            // Extra fragment packets are filled in by the owning packet's
            // PostBuild via `extra_fragments`; nothing to build here.
            return;
        }

        pkt.ip_header_offset = pkt.bytes.len();
        planned.size = planned.size.saturating_sub(HEADER_LEN);

        let (src, dst, ttl, ident) = match planned.direction {
            Direction::Reverse => {
                let ident = self.id_rev;
                self.id_rev = self.id_rev.wrapping_add(1);
                (self.dst, self.src, self.ttl_rev, ident)
            }
            _ => {
                let ident = self.id_fwd;
                self.id_fwd = self.id_fwd.wrapping_add(1);
                (self.src, self.dst, self.ttl_fwd, ident)
            }
        };

        let mut header = [0u8; 20];
        header[0] = 0x45; // version 4, IHL 5
        header[1] = 0; // DSCP/ECN
        // total_len and checksum patched in PostBuild once the full packet
        // is known.
        header[4..6].copy_from_slice(&ident.to_be_bytes());
        header[6] = 0x40; // Don't Fragment by default; cleared below if we fragment
        header[8] = ttl;
        header[9] = self.protocol;
        header[12..16].copy_from_slice(&src);
        header[16..20].copy_from_slice(&dst);

        if planned.params.fragment_count.is_some() {
            header[6] = 0x20; // More Fragments bit on the first fragment
        }

        pkt.append(&header);
    }

    fn post_build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket) {
        if planned.is_extra {
            return;
        }
        let offset = pkt.ip_header_offset;
        let total_len = (pkt.bytes.len() - offset) as u16;
        pkt.bytes[offset + 2..offset + 4].copy_from_slice(&total_len.to_be_bytes());
        pkt.bytes[offset + 10] = 0;
        pkt.bytes[offset + 11] = 0;
        let csum = Self::checksum(&pkt.bytes[offset..offset + 20]);
        pkt.bytes[offset + 10..offset + 12].copy_from_slice(&csum.to_be_bytes());

        let Some(_count) = planned.params.fragment_count else {
            return;
        };

        let prefix = pkt.bytes[..offset].to_vec();
        let header = pkt.bytes[offset..offset + 20].to_vec();
        let payload = pkt.bytes[offset + 20..].to_vec();

        // Split payload into 8-byte-aligned fragments.
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

        let build_fragment = |frag_off: u16, more: bool, data: &[u8]| -> Vec<u8> {
            let mut h = header.clone();
            let flags_frag = (if more { 0x2000u16 } else { 0 }) | frag_off;
            h[6..8].copy_from_slice(&flags_frag.to_be_bytes());
            let total = (h.len() + data.len()) as u16;
            h[2..4].copy_from_slice(&total.to_be_bytes());
            h[10] = 0;
            h[11] = 0;
            let csum = Self::checksum(&h);
            h[10..12].copy_from_slice(&csum.to_be_bytes());
            let mut out = prefix.clone();
            out.extend_from_slice(&h);
            out.extend_from_slice(data);
            out
        };

        let (first_off, first_more, first_data) = &fragments[0];
        pkt.bytes = build_fragment(*first_off, *first_more, first_data);
        pkt.ip_header_offset = offset;

        for (off, more, data) in &fragments[1..] {
            pkt.extra_fragments.push(build_fragment(*off, *more, data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::PlannedPacket;

    #[test]
    fn builds_twenty_byte_header() {
        let mut ip = Ipv4::new([1, 2, 3, 4], [5, 6, 7, 8], 17);
        let mut pkt = BuildingPacket::default();
        let mut planned = PlannedPacket::new(0);
        planned.size = 40;
        let mut rng = Rng::new(1);
        ip.build(&mut pkt, &mut planned, &mut rng);
        assert_eq!(pkt.bytes.len(), 20);
        assert_eq!(planned.size, 20);
        assert_eq!(&pkt.bytes[12..16], &[1, 2, 3, 4]);
    }

    #[test]
    fn post_build_patches_total_length() {
        let mut ip = Ipv4::new([1, 2, 3, 4], [5, 6, 7, 8], 17);
        let mut pkt = BuildingPacket::default();
        let mut planned = PlannedPacket::new(0);
        planned.size = 20;
        let mut rng = Rng::new(1);
        ip.build(&mut pkt, &mut planned, &mut rng);
        pkt.bytes.extend_from_slice(&[0xAA; 10]); // fake upper-layer bytes
        ip.post_build(&mut pkt, &mut planned);
        let total = u16::from_be_bytes([pkt.bytes[2], pkt.bytes[3]]);
        assert_eq!(total as usize, pkt.bytes.len());
    }
}
