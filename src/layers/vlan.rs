//! 802.1Q VLAN tag layer.

use crate::flow::Flow;
use crate::layers::{BuildingPacket, LayerOps, PlannedPacket};
use crate::random::Rng;

pub const HEADER_LEN: u64 = 4;
pub const TPID: u16 = 0x8100;

/// One 802.1Q tag. Stacks of these are used for Q-in-Q; `inner_ethertype`
/// names whatever sits above (another Vlan, Mpls, or an L3 layer).
#[derive(Debug, Clone)]
pub struct Vlan {
    pub vlan_id: u16,
    pub inner_ethertype: u16,
}

impl Vlan {
    pub fn new(vlan_id: u16, inner_ethertype: u16) -> Self {
        assert!(vlan_id < 4096, "VLAN id must fit in 12 bits");
        Vlan { vlan_id, inner_ethertype }
    }
}

impl LayerOps for Vlan {
    fn plan_flow(&mut self, _flow: &mut Flow, _rng: &mut Rng) {}

    fn build(&mut self, pkt: &mut BuildingPacket, _planned: &mut PlannedPacket, _rng: &mut Rng) {
        pkt.append(&TPID.to_be_bytes());
        pkt.append(&self.vlan_id.to_be_bytes());
        pkt.append(&self.inner_ethertype.to_be_bytes());
    }
}
