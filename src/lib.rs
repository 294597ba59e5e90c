//! Synthetic network-traffic generation and packet replay.
//!
//! Two cooperating subsystems live in this crate: [`flow`]/[`flowmaker`]/
//! [`calendar`]/[`generator`] synthesize a pcap file from per-flow
//! statistical profiles; [`replay`] reads such a file back and transmits it
//! through a pluggable output backend at a configurable, rewritten rate.

#![allow(clippy::too_many_arguments)]

pub mod addrgen;
pub mod calendar;
pub mod config;
pub mod domainname;
pub mod error;
pub mod flow;
pub mod flowmaker;
pub mod generator;
pub mod layers;
pub mod profile;
pub mod random;
pub mod replay;
pub mod sizesolver;
pub mod timestamps;
pub mod trafficmeter;
