//! Ethernet (802.3) layer: the bottom of every stack.

use crate::flow::Flow;
use crate::layers::{BuildingPacket, Direction, LayerOps, PlannedPacket};
use crate::random::Rng;

pub const HEADER_LEN: u64 = 14;

/// Ethernet header. `ethertype` is fixed at construction time by whichever
/// layer sits directly above it in the stack (0x0800 IPv4, 0x86DD IPv6,
/// 0x8100 VLAN, 0x8847 MPLS unicast).
#[derive(Debug, Clone)]
pub struct Ethernet {
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub ethertype: u16,
}

impl Ethernet {
    pub fn new(src_mac: [u8; 6], dst_mac: [u8; 6], ethertype: u16) -> Self {
        Ethernet { src_mac, dst_mac, ethertype }
    }
}

impl LayerOps for Ethernet {
    fn plan_flow(&mut self, _flow: &mut Flow, _rng: &mut Rng) {
        // Every packet in the flow carries an Ethernet header; size is
        // accounted for during Build (addressed relative to Ethernet-up
        // framing, the "size" field tracks the IP-and-above length per the
        // data model, so Ethernet intentionally does not add to `size`).
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, _rng: &mut Rng) {
        let (src, dst) = match planned.direction {
            Direction::Reverse => (self.dst_mac, self.src_mac),
            _ => (self.src_mac, self.dst_mac),
        };
        pkt.append(&dst);
        pkt.append(&src);
        pkt.append(&self.ethertype.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_fourteen_bytes() {
        let mut e = Ethernet::new([1; 6], [2; 6], 0x0800);
        let mut pkt = BuildingPacket::default();
        let mut planned = PlannedPacket::new(0);
        let mut rng = Rng::new(1);
        e.build(&mut pkt, &mut planned, &mut rng);
        assert_eq!(pkt.bytes.len(), HEADER_LEN as usize);
        assert_eq!(&pkt.bytes[12..14], &[0x08, 0x00]);
    }
}
