//! Replication strategies: per-replay-loop address/MAC rewriting so the
//! same captured pcap can stand in for many distinct flows across
//! repeated loops without becoming detectably identical traffic.

use crate::error::ConfigError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A per-unit strategy, applied once per packet that matches the unit.
#[derive(Debug, Clone)]
pub enum UnitStrategy {
    None,
    AddConstant(u64),
    /// Stateful: the counter starts at `start` and advances by `step` every
    /// time this strategy is applied (not just once per loop).
    AddCounter { start: u64, step: u64, current: u64 },
    SetMac([u8; 6]),
}

impl UnitStrategy {
    pub fn add_counter(start: u64, step: u64) -> Self {
        UnitStrategy::AddCounter { start, step, current: start }
    }
}

/// A per-loop strategy, re-evaluated with the current loop index every
/// time the replicator moves to loop `L`.
#[derive(Debug, Clone, Copy)]
pub enum LoopStrategy {
    None,
    AddOffset(u64),
}

fn apply_ip(addr: &[u8], delta: u64) -> Vec<u8> {
    match addr.len() {
        4 => {
            let base = u32::from_be_bytes(addr.try_into().unwrap());
            base.wrapping_add(delta as u32).to_be_bytes().to_vec()
        }
        16 => {
            let base = u128::from_be_bytes(addr.try_into().unwrap());
            base.wrapping_add(delta as u128).to_be_bytes().to_vec()
        }
        _ => addr.to_vec(),
    }
}

impl UnitStrategy {
    /// Applies this strategy to one address field, advancing any internal
    /// counter state.
    fn apply_to_ip(&mut self, addr: &[u8]) -> Vec<u8> {
        match self {
            UnitStrategy::None => addr.to_vec(),
            UnitStrategy::AddConstant(k) => apply_ip(addr, *k),
            UnitStrategy::AddCounter { step, current, .. } => {
                let out = apply_ip(addr, *current);
                *current = current.wrapping_add(*step);
                out
            }
            UnitStrategy::SetMac(_) => addr.to_vec(),
        }
    }

    fn apply_to_mac(&self, mac: &[u8; 6]) -> [u8; 6] {
        match self {
            UnitStrategy::SetMac(new_mac) => *new_mac,
            _ => *mac,
        }
    }
}

impl LoopStrategy {
    fn apply_to_ip(&self, addr: &[u8], loop_index: u64) -> Vec<u8> {
        match self {
            LoopStrategy::None => addr.to_vec(),
            LoopStrategy::AddOffset(k) => apply_ip(addr, k.wrapping_mul(loop_index)),
        }
    }
}

/// One field's worth of replication config: a unit-level strategy and
/// (for IPs) an optional loop-level one layered on top.
#[derive(Debug, Clone, Default)]
pub struct FieldStrategies {
    pub unit: Option<UnitStrategy>,
    pub loop_strategy: Option<LoopStrategy>,
}

/// The full set of rewrite rules for one replicated flow: independent
/// strategies for each of the four address fields.
#[derive(Debug, Clone, Default)]
pub struct Replicator {
    pub src_ip: FieldStrategies,
    pub dst_ip: FieldStrategies,
    pub src_mac: FieldStrategies,
    pub dst_mac: FieldStrategies,
}

impl Replicator {
    pub fn new() -> Self {
        Replicator::default()
    }

    /// Unit-level strategies apply first, then loop-level with the current
    /// loop index.
    pub fn rewrite_ip(field: &mut FieldStrategies, addr: &[u8], loop_index: u64) -> Vec<u8> {
        let after_unit = match &mut field.unit {
            Some(strategy) => strategy.apply_to_ip(addr),
            None => addr.to_vec(),
        };
        match &field.loop_strategy {
            Some(strategy) => strategy.apply_to_ip(&after_unit, loop_index),
            None => after_unit,
        }
    }

    pub fn rewrite_mac(field: &FieldStrategies, mac: &[u8; 6]) -> [u8; 6] {
        match &field.unit {
            Some(strategy) => strategy.apply_to_mac(mac),
            None => *mac,
        }
    }
}

/// Parses one strategy string (`"None"`, `"addConstant(42)"`,
/// `"addCounter(10,2)"`, a bare MAC literal, `"addOffset(7)"`) against the
/// grammar a given field accepts.
pub fn parse_ip_unit_strategy(s: &str) -> Result<UnitStrategy, ConfigError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("none") {
        return Ok(UnitStrategy::None);
    }
    if let Some(n) = parse_call(s, "addConstant") {
        let k: u64 = n.trim().parse().map_err(|_| ConfigError::BadStrategy { strategy: s.to_string() })?;
        return Ok(UnitStrategy::AddConstant(k));
    }
    if let Some(args) = parse_call(s, "addCounter") {
        let mut parts = args.split(',');
        let start: u64 = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(|| ConfigError::BadStrategy { strategy: s.to_string() })?;
        let step: u64 = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(|| ConfigError::BadStrategy { strategy: s.to_string() })?;
        return Ok(UnitStrategy::add_counter(start, step));
    }
    Err(ConfigError::BadStrategy { strategy: s.to_string() })
}

pub fn parse_loop_strategy(s: &str) -> Result<LoopStrategy, ConfigError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("none") {
        return Ok(LoopStrategy::None);
    }
    if let Some(n) = parse_call(s, "addOffset") {
        let k: u64 = n.trim().parse().map_err(|_| ConfigError::BadStrategy { strategy: s.to_string() })?;
        return Ok(LoopStrategy::AddOffset(k));
    }
    Err(ConfigError::BadStrategy { strategy: s.to_string() })
}

pub fn parse_mac_unit_strategy(s: &str) -> Result<UnitStrategy, ConfigError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("none") {
        return Ok(UnitStrategy::None);
    }
    let octets: Vec<&str> = s.split(':').collect();
    if octets.len() != 6 {
        return Err(ConfigError::BadStrategy { strategy: s.to_string() });
    }
    let mut mac = [0u8; 6];
    for (i, o) in octets.iter().enumerate() {
        mac[i] = u8::from_str_radix(o, 16).map_err(|_| ConfigError::BadStrategy { strategy: s.to_string() })?;
    }
    Ok(UnitStrategy::SetMac(mac))
}

fn parse_call<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{name}(");
    if s.starts_with(&prefix) && s.ends_with(')') {
        Some(&s[prefix.len()..s.len() - 1])
    } else {
        None
    }
}

/// Parses a dotted-quad or colon-hex IP literal the way the generator's
/// profile loader does, so `addConstant`'s base and any literal addresses
/// in replay config round-trip identically.
pub fn parse_ip_literal(s: &str) -> Option<Vec<u8>> {
    match s.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some(Ipv4Addr::octets(&v4).to_vec()),
        IpAddr::V6(v6) => Some(Ipv6Addr::octets(&v6).to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_constant_wraps_within_address_width() {
        let mut strategy = UnitStrategy::AddConstant(1);
        let out = strategy.apply_to_ip(&[255, 255, 255, 255]);
        assert_eq!(out, vec![0, 0, 0, 0]);
    }

    #[test]
    fn add_counter_advances_each_application() {
        let mut strategy = UnitStrategy::add_counter(10, 5);
        let first = strategy.apply_to_ip(&[0, 0, 0, 0]);
        let second = strategy.apply_to_ip(&[0, 0, 0, 0]);
        assert_eq!(first, vec![0, 0, 0, 10]);
        assert_eq!(second, vec![0, 0, 0, 15]);
    }

    #[test]
    fn unit_then_loop_strategies_compose() {
        let mut field = FieldStrategies {
            unit: Some(UnitStrategy::AddConstant(1)),
            loop_strategy: Some(LoopStrategy::AddOffset(100)),
        };
        let out = Replicator::rewrite_ip(&mut field, &[10, 0, 0, 0], 3);
        // +1 from the unit strategy, then +300 (100 * loop 3) from the loop strategy.
        assert_eq!(out, vec![10, 0, 1, 45]);
    }

    #[test]
    fn set_mac_only_affects_mac_rewrite() {
        let field = FieldStrategies { unit: Some(UnitStrategy::SetMac([1, 2, 3, 4, 5, 6])), loop_strategy: None };
        let out = Replicator::rewrite_mac(&field, &[0; 6]);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn parses_strategy_strings() {
        assert!(matches!(parse_ip_unit_strategy("None").unwrap(), UnitStrategy::None));
        assert!(matches!(parse_ip_unit_strategy("addConstant(5)").unwrap(), UnitStrategy::AddConstant(5)));
        assert!(matches!(parse_loop_strategy("addOffset(7)").unwrap(), LoopStrategy::AddOffset(7)));
        assert!(parse_ip_unit_strategy("bogus(1)").is_err());
    }
}
