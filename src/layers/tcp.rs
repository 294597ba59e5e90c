//! TCP layer: sequence/ack tracking and the handshake-fits-the-budget
//! heuristic.

use crate::flow::{Flow, L3Proto, ASSUMED_MTU};
use crate::layers::ethernet::HEADER_LEN as ETH_LEN;
use crate::layers::ipv4::HEADER_LEN as IPV4_LEN;
use crate::layers::ipv6::HEADER_LEN as IPV6_LEN;
use crate::layers::{BuildingPacket, Direction, HandshakeKind, LayerOps, PlannedPacket};
use crate::random::Rng;

pub const HEADER_LEN: u64 = 20;
pub const FIXED_WINDOW: u16 = 64512;

const CONN_HANDSHAKE_FWD_PKTS: u64 = 2;
const CONN_HANDSHAKE_REV_PKTS: u64 = 1;
const TERM_HANDSHAKE_FWD_PKTS: u64 = 2;
const TERM_HANDSHAKE_REV_PKTS: u64 = 2;
const CONN_HANDSHAKE_FWD_BYTES: u64 = CONN_HANDSHAKE_FWD_PKTS * HEADER_LEN;
const CONN_HANDSHAKE_REV_BYTES: u64 = CONN_HANDSHAKE_REV_PKTS * HEADER_LEN;
const TERM_HANDSHAKE_FWD_BYTES: u64 = TERM_HANDSHAKE_FWD_PKTS * HEADER_LEN;
const TERM_HANDSHAKE_REV_BYTES: u64 = TERM_HANDSHAKE_REV_PKTS * HEADER_LEN;

/// Ceiling for average bytes-per-packet used to decide whether planning a
/// handshake would blow the MTU budget. Preserved verbatim from the
/// reference heuristic: `1500 - Ethernet header - L3 header`.
pub fn calc_max_bytes_per_pkt(l3_header_len: u64) -> u64 {
    ASSUMED_MTU.saturating_sub(ETH_LEN).saturating_sub(l3_header_len)
}

#[derive(Debug, Clone)]
pub struct Tcp {
    pub src_port: u16,
    pub dst_port: u16,
    seq_fwd: u32,
    seq_rev: u32,
    ack_fwd: u32,
    ack_rev: u32,
}

impl Tcp {
    pub fn new(src_port: u16, dst_port: u16, rng: &mut Rng) -> Self {
        Tcp {
            src_port,
            dst_port,
            seq_fwd: rng.uniform_u64(u32::MAX as u64) as u32,
            seq_rev: rng.uniform_u64(u32::MAX as u64) as u32,
            ack_fwd: 0,
            ack_rev: 0,
        }
    }

    /// Mirrors the reference `DetermineIfHandshakesShouldBePlanned`: requires
    /// enough packets and bytes in *each* direction for a full handshake,
    /// requires that skipping payload placement never happens (a direction
    /// left with zero packets but nonzero bytes after the handshake is
    /// claimed), and only backs out of the handshake if planning it would be
    /// the difference between fitting the per-packet MTU budget and not.
    fn handshake_fits(&self, flow: &Flow) -> bool {
        let fwd_pkts = flow.fwd_pkts_target;
        let rev_pkts = flow.rev_pkts_target;
        let fwd_bytes = flow.fwd_bytes_target;
        let rev_bytes = flow.rev_bytes_target;

        if fwd_pkts < CONN_HANDSHAKE_FWD_PKTS + TERM_HANDSHAKE_FWD_PKTS
            || rev_pkts < CONN_HANDSHAKE_REV_PKTS + TERM_HANDSHAKE_REV_PKTS
            || fwd_bytes < CONN_HANDSHAKE_FWD_BYTES + TERM_HANDSHAKE_FWD_BYTES
            || rev_bytes < CONN_HANDSHAKE_REV_BYTES + TERM_HANDSHAKE_REV_BYTES
        {
            return false;
        }

        let fwd_pkts_remaining = fwd_pkts - CONN_HANDSHAKE_FWD_PKTS - TERM_HANDSHAKE_FWD_PKTS;
        let fwd_bytes_remaining = fwd_bytes - CONN_HANDSHAKE_FWD_BYTES - TERM_HANDSHAKE_FWD_BYTES;
        let rev_pkts_remaining = rev_pkts - CONN_HANDSHAKE_REV_PKTS - TERM_HANDSHAKE_REV_PKTS;
        let rev_bytes_remaining = rev_bytes - CONN_HANDSHAKE_REV_BYTES - TERM_HANDSHAKE_REV_BYTES;

        if (fwd_pkts_remaining == 0 && fwd_bytes_remaining > 0) || (rev_pkts_remaining == 0 && rev_bytes_remaining > 0) {
            return false;
        }

        let fwd_bpp = if fwd_pkts_remaining == 0 { 0 } else { fwd_bytes_remaining / fwd_pkts_remaining };
        let rev_bpp = if rev_pkts_remaining == 0 { 0 } else { rev_bytes_remaining / rev_pkts_remaining };
        let fwd_bpp_alt = if fwd_pkts == 0 { 0 } else { fwd_bytes / fwd_pkts };
        let rev_bpp_alt = if rev_pkts == 0 { 0 } else { rev_bytes / rev_pkts };

        let l3_header_len = match flow.l3_proto {
            L3Proto::V4 => IPV4_LEN,
            L3Proto::V6 => IPV6_LEN,
        };
        let max_bpp = calc_max_bytes_per_pkt(l3_header_len);

        !((fwd_bpp > max_bpp && fwd_bpp_alt <= max_bpp) || (rev_bpp > max_bpp && rev_bpp_alt <= max_bpp))
    }
}

impl LayerOps for Tcp {
    fn plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        for pkt in flow.packets.iter_mut() {
            pkt.size += HEADER_LEN;
        }

        if self.handshake_fits(flow) && flow.packets.len() >= 7 {
            let n = flow.packets.len();
            let kinds_and_dirs = [
                (HandshakeKind::SynOpen, Direction::Forward),
                (HandshakeKind::SynAckOpen, Direction::Reverse),
                (HandshakeKind::AckOpen, Direction::Forward),
            ];
            for (i, (kind, dir)) in kinds_and_dirs.iter().enumerate() {
                let pkt = &mut flow.packets[i];
                pkt.params.handshake = Some(*kind);
                pkt.direction = *dir;
                pkt.is_finished = true;
            }
            let close_kinds_and_dirs = [
                (HandshakeKind::FinClose, Direction::Forward),
                (HandshakeKind::FinAckClose, Direction::Reverse),
                (HandshakeKind::AckClose, Direction::Forward),
                (HandshakeKind::AckClose, Direction::Reverse),
            ];
            for (j, (kind, dir)) in close_kinds_and_dirs.iter().enumerate() {
                let idx = n - close_kinds_and_dirs.len() + j;
                let pkt = &mut flow.packets[idx];
                pkt.params.handshake = Some(*kind);
                pkt.direction = *dir;
                pkt.is_finished = true;
            }
        }
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, _rng: &mut Rng) {
        planned.size = planned.size.saturating_sub(HEADER_LEN);

        let (sport, dport) = match planned.direction {
            Direction::Reverse => (self.dst_port, self.src_port),
            _ => (self.src_port, self.dst_port),
        };

        let (seq, ack, flags): (u32, u32, u8) = match planned.params.handshake {
            Some(HandshakeKind::SynOpen) => (self.seq_fwd, 0, 0x02),
            Some(HandshakeKind::SynAckOpen) => (self.seq_rev, self.seq_fwd.wrapping_add(1), 0x12),
            Some(HandshakeKind::AckOpen) => (self.seq_fwd.wrapping_add(1), self.seq_rev.wrapping_add(1), 0x10),
            Some(HandshakeKind::FinClose) => (self.seq_fwd, self.ack_fwd, 0x11),
            Some(HandshakeKind::FinAckClose) => (self.seq_rev, self.ack_rev, 0x11),
            Some(HandshakeKind::AckClose) => match planned.direction {
                Direction::Forward => (self.seq_fwd, self.ack_fwd, 0x10),
                _ => (self.seq_rev, self.ack_rev, 0x10),
            },
            None => match planned.direction {
                Direction::Forward | Direction::Unknown => (self.seq_fwd, self.ack_fwd, 0x18),
                Direction::Reverse => (self.seq_rev, self.ack_rev, 0x18),
            },
        };

        let mut header = [0u8; 20];
        header[0..2].copy_from_slice(&sport.to_be_bytes());
        header[2..4].copy_from_slice(&dport.to_be_bytes());
        header[4..8].copy_from_slice(&seq.to_be_bytes());
        header[8..12].copy_from_slice(&ack.to_be_bytes());
        header[12] = 0x50; // data offset 5 (no options)
        header[13] = flags;
        header[14..16].copy_from_slice(&FIXED_WINDOW.to_be_bytes());
        pkt.append(&header);

        let payload_len = planned.size;
        match planned.direction {
            Direction::Forward | Direction::Unknown => {
                self.seq_fwd = self.seq_fwd.wrapping_add(payload_len as u32);
                self.ack_rev = self.seq_fwd;
            }
            Direction::Reverse => {
                self.seq_rev = self.seq_rev.wrapping_add(payload_len as u32);
                self.ack_fwd = self.seq_rev;
            }
        }
        match planned.params.handshake {
            Some(HandshakeKind::SynOpen) | Some(HandshakeKind::SynAckOpen) | Some(HandshakeKind::FinClose) | Some(HandshakeKind::FinAckClose) => {
                match planned.direction {
                    Direction::Forward | Direction::Unknown => self.seq_fwd = self.seq_fwd.wrapping_add(1),
                    Direction::Reverse => self.seq_rev = self.seq_rev.wrapping_add(1),
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_bytes_per_pkt_is_mtu_minus_headers() {
        assert_eq!(calc_max_bytes_per_pkt(20), 1500 - 14 - 20);
    }
}
