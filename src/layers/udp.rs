//! UDP layer: an 8-byte header contributed to every packet.

use crate::flow::Flow;
use crate::layers::{BuildingPacket, Direction, LayerOps, PlannedPacket};
use crate::random::Rng;

pub const HEADER_LEN: u64 = 8;

#[derive(Debug, Clone)]
pub struct Udp {
    pub src_port: u16,
    pub dst_port: u16,
}

impl Udp {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Udp { src_port, dst_port }
    }
}

impl LayerOps for Udp {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        for pkt in flow.packets.iter_mut() {
            pkt.size += HEADER_LEN;
        }
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, _rng: &mut Rng) {
        planned.size = planned.size.saturating_sub(HEADER_LEN);
        let (sport, dport) = match planned.direction {
            Direction::Reverse => (self.dst_port, self.src_port),
            _ => (self.src_port, self.dst_port),
        };
        let length = (HEADER_LEN + planned.size) as u16;
        let mut header = [0u8; 8];
        header[0..2].copy_from_slice(&sport.to_be_bytes());
        header[2..4].copy_from_slice(&dport.to_be_bytes());
        header[4..6].copy_from_slice(&length.to_be_bytes());
        // Checksum left as 0 (optional over IPv4); IPv6 replay/consumers in
        // this crate don't validate it.
        pkt.append(&header);
    }
}
