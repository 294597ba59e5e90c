//! MPLS label stack layer. A Vlan may not follow an Mpls layer in the same
//! stack (enforced at flow-construction time, not here).

use crate::flow::Flow;
use crate::layers::{BuildingPacket, LayerOps, PlannedPacket};
use crate::random::Rng;

pub const HEADER_LEN: u64 = 4;

#[derive(Debug, Clone)]
pub struct Mpls {
    pub label: u32,
    pub bottom_of_stack: bool,
    pub ttl: u8,
}

impl Mpls {
    pub fn new(label: u32, bottom_of_stack: bool, ttl: u8) -> Self {
        assert!(label < (1 << 20), "MPLS label must fit in 20 bits");
        Mpls { label, bottom_of_stack, ttl }
    }
}

impl LayerOps for Mpls {
    fn plan_flow(&mut self, _flow: &mut Flow, _rng: &mut Rng) {}

    fn build(&mut self, pkt: &mut BuildingPacket, _planned: &mut PlannedPacket, _rng: &mut Rng) {
        let mut word = (self.label << 12) | (0 << 9);
        if self.bottom_of_stack {
            word |= 1 << 8;
        }
        word |= self.ttl as u32;
        pkt.append(&word.to_be_bytes());
    }
}
