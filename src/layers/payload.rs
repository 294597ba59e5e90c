//! Generic payload layer: the default terminal layer above any L4 protocol
//! that doesn't get a protocol-aware substitute (Http, Dns).

use crate::flow::Flow;
use crate::layers::{BuildingPacket, LayerOps, PlannedPacket};
use crate::random::Rng;

#[derive(Debug, Clone, Default)]
pub struct Payload;

impl LayerOps for Payload {
    fn plan_flow(&mut self, _flow: &mut Flow, _rng: &mut Rng) {
        // Contributes no header bytes and doesn't finalize packets: the
        // size solver still needs to fill in `size` for ordinary data
        // packets before Build consumes the remainder as random bytes.
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        let data = rng.random_bytes(planned.size as usize);
        pkt.append(&data);
        planned.size = 0;
    }
}
