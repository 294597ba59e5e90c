//! NFB (FPGA NIC) output backend. The firmware capability probe and the
//! replicator header/super-packet layout are pure computation and fully
//! implemented; the actual DMA transfer path needs the vendor `libnfb`
//! bindings and real hardware, so the queue I/O methods return
//! [`ReplayError::Unsupported`] without it.

use super::{OutputBackend, OutputQueue, OffloadGrant, OffloadRequest, QueueStats};
use crate::error::ReplayError;

/// A tiny hand-rolled bitflags macro: the pack pulls in `bitflags` nowhere
/// else, and four bits don't earn the dependency.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub $repr);

        impl $name {
            pub const EMPTY: $name = $name(0);
            $(pub const $flag: $name = $name($value);)*

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_like! {
    /// One bit per firmware device-tree "compatible" string this backend
    /// recognizes.
    pub struct NfbCapabilities: u8 {
        const CHECKSUM_OFFLOAD = 0b0001; // "app_core"
        const SUPER_PACKETS    = 0b0010; // "frame_unpacker"
        const TIMESTAMP_LIMITER = 0b0100; // "timestamp_limiter"
        const RATE_LIMITER     = 0b1000; // "rate_limiter"
    }
}

/// Probes a firmware device-tree's list of "compatible" strings (as read
/// from `/sys/bus/pci/devices/.../fdt` on real hardware) and returns the
/// capability bitmask.
pub fn probe_capabilities(compatible_strings: &[&str]) -> NfbCapabilities {
    let mut caps = NfbCapabilities::EMPTY;
    for s in compatible_strings {
        match *s {
            "app_core" => caps.insert(NfbCapabilities::CHECKSUM_OFFLOAD),
            "frame_unpacker" => caps.insert(NfbCapabilities::SUPER_PACKETS),
            "timestamp_limiter" => caps.insert(NfbCapabilities::TIMESTAMP_LIMITER),
            "rate_limiter" => caps.insert(NfbCapabilities::RATE_LIMITER),
            _ => {}
        }
    }
    caps
}

/// L3/L4 type tags carried in the replicator header, distinct from IP
/// protocol numbers since the header also needs to say "none of the
/// above" for non-IP traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L3Tag {
    None,
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4Tag {
    None,
    Tcp,
    Udp,
}

/// The 16-byte replicator header prefixed to each packet when the firmware
/// image supports it: total length, L2 length, L3 length, checksum-request
/// flags, L3/L4 type tags, and a 48-bit timestamp.
#[derive(Debug, Clone, Copy)]
pub struct ReplicatorHeader {
    pub total_len: u16,
    pub l2_len: u16,
    pub l3_len: u16,
    pub checksum_request_l3: bool,
    pub checksum_request_l4: bool,
    pub l3_tag: L3Tag,
    pub l4_tag: L4Tag,
    pub timestamp_48: u64,
}

impl ReplicatorHeader {
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.total_len.to_be_bytes());
        out[2..4].copy_from_slice(&self.l2_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.l3_len.to_be_bytes());
        let mut flags = 0u8;
        if self.checksum_request_l3 {
            flags |= 0b01;
        }
        if self.checksum_request_l4 {
            flags |= 0b10;
        }
        out[6] = flags;
        out[7] = match self.l3_tag {
            L3Tag::None => 0,
            L3Tag::Ipv4 => 1,
            L3Tag::Ipv6 => 2,
        };
        out[8] = match self.l4_tag {
            L4Tag::None => 0,
            L4Tag::Tcp => 1,
            L4Tag::Udp => 2,
        };
        // 48-bit timestamp, big-endian, in the low 6 bytes of [9..16) minus
        // the pad byte at [15].
        let ts = self.timestamp_48.to_be_bytes();
        out[9..15].copy_from_slice(&ts[2..8]);
        out[15] = 0; // reserved/pad
        out
    }
}

/// Packs as many packets as fit into one NDP descriptor: bounded by the
/// firmware's `unpack_limit` (max packets per descriptor) and a byte cap,
/// with each sub-packet's header aligned to 8 bytes.
pub fn pack_super_packet(packets: &[Vec<u8>], unpack_limit: usize, byte_cap: usize) -> Vec<Vec<u8>> {
    let mut descriptors = Vec::new();
    let mut current = Vec::new();
    let mut current_count = 0;

    for pkt in packets {
        let padded_len = (pkt.len() + 7) & !7;
        if current_count >= unpack_limit || current.len() + padded_len > byte_cap {
            if !current.is_empty() {
                descriptors.push(std::mem::take(&mut current));
            }
            current_count = 0;
        }
        current.extend_from_slice(pkt);
        current.resize(current.len() + (padded_len - pkt.len()), 0);
        current_count += 1;
    }
    if !current.is_empty() {
        descriptors.push(current);
    }
    descriptors
}

/// Derives the rate-limiter register values from firmware clock frequency
/// and the requested rate; `by_bytes` selects bps vs pps shaping via the
/// firmware's direction flag bit.
pub struct RateLimiterRegisters {
    pub section_length: u32,
    pub speed: u32,
    pub by_bytes: bool,
}

pub fn derive_rate_limiter_registers(clock_hz: u64, tokens_per_second: u64, by_bytes: bool) -> RateLimiterRegisters {
    let speed = ((tokens_per_second.saturating_mul(1 << 16)) / clock_hz.max(1)).min(u32::MAX as u64) as u32;
    let section_length = (clock_hz / 1000).min(u32::MAX as u64) as u32;
    RateLimiterRegisters { section_length, speed, by_bytes }
}

pub struct NfbQueue;

impl OutputQueue for NfbQueue {
    fn acquire(&mut self, _frame_count: usize) -> Result<usize, ReplayError> {
        Err(ReplayError::Unsupported("NFB support requires building with the nfb feature and libnfb".into()))
    }

    fn commit_burst(&mut self, _frames: &[Vec<u8>]) -> Result<usize, ReplayError> {
        Err(ReplayError::Unsupported("NFB support requires building with the nfb feature and libnfb".into()))
    }

    fn max_burst_size(&self) -> usize {
        0
    }

    fn flush(&mut self) -> Result<(), ReplayError> {
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        QueueStats::default()
    }
}

pub struct NfbBackend {
    queue: NfbQueue,
    capabilities: NfbCapabilities,
}

impl NfbBackend {
    pub fn open(_device_path: &str) -> Result<Self, ReplayError> {
        Err(ReplayError::Unsupported("NFB support requires building with the nfb feature and libnfb".into()))
    }

    pub fn capabilities(&self) -> NfbCapabilities {
        self.capabilities
    }
}

impl OutputBackend for NfbBackend {
    fn queue_count(&self) -> usize {
        0
    }

    fn get_queue(&mut self, _id: usize) -> Result<&mut dyn OutputQueue, ReplayError> {
        Ok(&mut self.queue)
    }

    fn mtu(&self) -> usize {
        9000
    }

    fn numa_node(&self) -> Option<u32> {
        None
    }

    fn configure_offloads(&mut self, requests: OffloadRequest) -> OffloadGrant {
        OffloadGrant {
            checksum_offload: requests.checksum_offload && self.capabilities.contains(NfbCapabilities::CHECKSUM_OFFLOAD),
            super_packets: requests.super_packets && self.capabilities.contains(NfbCapabilities::SUPER_PACKETS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_recognizes_known_compatible_strings() {
        let caps = probe_capabilities(&["app_core", "rate_limiter", "unrelated_ip_core"]);
        assert!(caps.contains(NfbCapabilities::CHECKSUM_OFFLOAD));
        assert!(caps.contains(NfbCapabilities::RATE_LIMITER));
        assert!(!caps.contains(NfbCapabilities::SUPER_PACKETS));
    }

    #[test]
    fn header_round_trips_fields() {
        let hdr = ReplicatorHeader {
            total_len: 128,
            l2_len: 14,
            l3_len: 20,
            checksum_request_l3: true,
            checksum_request_l4: false,
            l3_tag: L3Tag::Ipv4,
            l4_tag: L4Tag::Tcp,
            timestamp_48: 0x0000_1234_5678,
        };
        let bytes = hdr.to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 128);
        assert_eq!(bytes[6] & 0b01, 0b01);
        assert_eq!(bytes[6] & 0b10, 0);
        assert_eq!(bytes[7], 1);
        assert_eq!(bytes[8], 1);
    }

    #[test]
    fn super_packet_packing_respects_unpack_limit() {
        let pkts = vec![vec![0u8; 60]; 5];
        let descriptors = pack_super_packet(&pkts, 2, 10_000);
        assert_eq!(descriptors.len(), 3);
    }

    #[test]
    fn super_packet_packing_respects_byte_cap() {
        let pkts = vec![vec![0u8; 60]; 5];
        let descriptors = pack_super_packet(&pkts, 100, 120);
        assert!(descriptors.iter().all(|d| d.len() <= 128));
    }
}
