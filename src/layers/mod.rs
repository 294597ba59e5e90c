//! The protocol layer stack and its two-phase plan→build pipeline.
//!
//! A [`crate::flow::Flow`] owns an ordered, bottom-to-top stack of [`Layer`]
//! variants. Each layer implements [`LayerOps`]'s plan/build hooks. Layers
//! are a tagged enum rather than trait objects (per the design note on
//! layer polymorphism): this keeps ownership simple (the Flow owns
//! `Vec<Layer>` directly) and lets `Build` dispatch without an allocation.
//!
//! The Flow reference is passed explicitly into every hook rather than
//! stored as a back-pointer inside the layer, scoped only to the duration of
//! a single planning or build call.

pub mod dns;
pub mod ethernet;
pub mod http;
pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod mpls;
pub mod payload;
pub mod tcp;
pub mod udp;
pub mod vlan;

use crate::flow::Flow;
use crate::random::Rng;

/// Direction of a planned or built packet relative to the flow's initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Unknown,
    Forward,
    Reverse,
}

impl Direction {
    pub fn swap(self) -> Direction {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
            Direction::Unknown => Direction::Unknown,
        }
    }
}

/// TCP handshake role a planned packet plays, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    SynOpen,
    SynAckOpen,
    AckOpen,
    FinClose,
    FinAckClose,
    AckClose,
}

/// HTTP message-run position tag applied by the HTTP layer's `PostPlanFlow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMessageKind {
    ReqInitial,
    ReqContinuation,
    ResInitial,
    ResContinuation,
}

/// Sparse, flat per-layer parameters attached to a planned packet.
///
/// A map keyed by arbitrary layer index would let layers stay fully opaque,
/// but the actual parameter set is small and known ahead of time, so (per
/// the design note on variant-valued params) this is a flat struct of
/// `Option`s instead.
#[derive(Debug, Clone, Default)]
pub struct LayerParams {
    pub fragment_count: Option<u32>,
    pub handshake: Option<HandshakeKind>,
    pub http_message: Option<HttpMessageKind>,
    pub http_message_size: Option<u64>,
    pub dns_is_query: Option<bool>,
}

/// A packet skeleton produced by the plan phase: direction, timestamp, size
/// budget, and per-layer params, but no concrete bytes yet.
#[derive(Debug, Clone)]
pub struct PlannedPacket {
    pub direction: Direction,
    pub timestamp_ns: u64,
    /// IP-and-above length; grows as each layer's `PlanFlow` adds its
    /// minimum header contribution, shrinks again during `Build` as each
    /// layer consumes its share.
    pub size: u64,
    /// No further layers may append once set (e.g. handshake control
    /// packets, which have no payload).
    pub is_finished: bool,
    /// Created during `PostPlanFlow` (typically for fragmentation).
    pub is_extra: bool,
    pub params: LayerParams,
}

impl PlannedPacket {
    pub fn new(timestamp_ns: u64) -> Self {
        PlannedPacket {
            direction: Direction::Unknown,
            timestamp_ns,
            size: 0,
            is_finished: false,
            is_extra: false,
            params: LayerParams::default(),
        }
    }
}

/// An in-progress concrete packet being assembled bottom-up during `Build`.
#[derive(Debug, Default)]
pub struct BuildingPacket {
    /// Bytes built so far, Ethernet header first.
    pub bytes: Vec<u8>,
    /// Offset in `bytes` where the most recently built layer's header
    /// starts; used by `PostBuild` fragmentation to locate the IP header.
    pub ip_header_offset: usize,
    /// Complete standalone packets produced by IPv4/IPv6 fragmentation
    /// (fragments after the first, which replaces `bytes` in place). The
    /// caller drains these into the flow's pending-fragment queue and
    /// emits them in place of the matching `is_extra` planned packets.
    pub extra_fragments: Vec<Vec<u8>>,
}

impl BuildingPacket {
    pub fn append(&mut self, header: &[u8]) {
        self.bytes.extend_from_slice(header);
    }
}

/// The plan/build hook set every layer implements.
///
/// Mirrors the original `Layer` interface
/// (`AddedToFlow`/`PlanFlow`/`PostPlanFlow`/`PlanExtra`/`Build`/`PostBuild`);
/// `AddedToFlow`'s only real job (remembering this layer's stack index) is
/// handled by the caller passing `layer_index` explicitly instead.
pub trait LayerOps {
    /// First plan pass: append this layer to every planned packet's
    /// participant list (implicitly, by contributing to `size`) and set
    /// directions/finish-flags/handshake structure as needed.
    fn plan_flow(&mut self, flow: &mut Flow, rng: &mut Rng);

    /// Second plan pass: protocol-aware adjustments that may insert extra
    /// packets (fragmentation) or react to sibling layers' decisions.
    fn post_plan_flow(&mut self, _flow: &mut Flow, _rng: &mut Rng) {}

    /// Third plan pass: attach this layer to any extras it inserted.
    fn plan_extra(&mut self, _flow: &mut Flow, _rng: &mut Rng) {}

    /// Append this layer's header bytes to `pkt`, consuming from
    /// `planned.size`.
    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng);

    /// Runs after every layer above has built its bytes; used by IPv4/IPv6
    /// to splice fragmentation.
    fn post_build(&mut self, _pkt: &mut BuildingPacket, _planned: &mut PlannedPacket) {}
}

/// Tagged union of every supported layer kind.
#[derive(Debug)]
pub enum Layer {
    Ethernet(ethernet::Ethernet),
    Vlan(vlan::Vlan),
    Mpls(mpls::Mpls),
    Ipv4(ipv4::Ipv4),
    Ipv6(ipv6::Ipv6),
    Tcp(tcp::Tcp),
    Udp(udp::Udp),
    IcmpEcho(icmp::IcmpEcho),
    IcmpRandom(icmp::IcmpRandom),
    Icmpv6Echo(icmp::Icmpv6Echo),
    Icmpv6Random(icmp::Icmpv6Random),
    Payload(payload::Payload),
    Http(http::Http),
    Dns(dns::Dns),
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $($arg:ident),*) => {
        match $self {
            Layer::Ethernet(l) => l.$method($($arg),*),
            Layer::Vlan(l) => l.$method($($arg),*),
            Layer::Mpls(l) => l.$method($($arg),*),
            Layer::Ipv4(l) => l.$method($($arg),*),
            Layer::Ipv6(l) => l.$method($($arg),*),
            Layer::Tcp(l) => l.$method($($arg),*),
            Layer::Udp(l) => l.$method($($arg),*),
            Layer::IcmpEcho(l) => l.$method($($arg),*),
            Layer::IcmpRandom(l) => l.$method($($arg),*),
            Layer::Icmpv6Echo(l) => l.$method($($arg),*),
            Layer::Icmpv6Random(l) => l.$method($($arg),*),
            Layer::Payload(l) => l.$method($($arg),*),
            Layer::Http(l) => l.$method($($arg),*),
            Layer::Dns(l) => l.$method($($arg),*),
        }
    };
}

impl Layer {
    pub fn plan_flow(&mut self, flow: &mut Flow, rng: &mut Rng) {
        dispatch!(self, plan_flow, flow, rng)
    }
    pub fn post_plan_flow(&mut self, flow: &mut Flow, rng: &mut Rng) {
        dispatch!(self, post_plan_flow, flow, rng)
    }
    pub fn plan_extra(&mut self, flow: &mut Flow, rng: &mut Rng) {
        dispatch!(self, plan_extra, flow, rng)
    }
    pub fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        dispatch!(self, build, pkt, planned, rng)
    }
    pub fn post_build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket) {
        dispatch!(self, post_build, pkt, planned)
    }

    pub fn is_l3(&self) -> bool {
        matches!(self, Layer::Ipv4(_) | Layer::Ipv6(_))
    }
    pub fn is_l4(&self) -> bool {
        matches!(
            self,
            Layer::Tcp(_)
                | Layer::Udp(_)
                | Layer::IcmpEcho(_)
                | Layer::IcmpRandom(_)
                | Layer::Icmpv6Echo(_)
                | Layer::Icmpv6Random(_)
        )
    }
}
