//! Generator YAML configuration: address ranges, fragmentation knobs,
//! encapsulation, payload protocol enablement, and timestamp pacing.
//!
//! Deserializes with `#[serde(deny_unknown_fields)]` throughout so an
//! unrecognized key at any nesting level is a hard [`ConfigError`], matching
//! the "unknown keys are fatal" contract; `serde_yaml`'s error carries the
//! offending path and line, which is threaded into the error message.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AddressRangeConfig {
    pub ip_range: Option<String>,
    pub mac_range: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncapsulationEntry {
    #[serde(rename = "type")]
    pub kind: EncapsulationKind,
    pub id: Option<u32>,
    pub label: Option<u32>,
    #[serde(default = "default_probability")]
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncapsulationKind {
    Vlan,
    Mpls,
}

fn default_probability() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TlsEncryptionConfig {
    #[serde(default)]
    pub always_encrypt_ports: Vec<u16>,
    #[serde(default)]
    pub never_encrypt_ports: Vec<u16>,
    #[serde(default)]
    pub otherwise_with_probability: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PayloadConfig {
    #[serde(default)]
    pub enabled_protocols: Vec<String>,
    #[serde(default)]
    pub tls_encryption: TlsEncryptionConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TimestampsConfig {
    pub link_speed: Option<String>,
    pub min_packet_gap: Option<String>,
    pub flow_min_dir_switch_gap: Option<String>,
    pub flow_max_interpacket_gap: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfigFile {
    #[serde(default)]
    pub ipv4: AddressRangeConfig,
    #[serde(default)]
    pub ipv6: AddressRangeConfig,
    #[serde(default)]
    pub mac: AddressRangeConfig,
    #[serde(default)]
    pub fragmentation_probability: Option<ProbabilityValue>,
    pub min_packet_size_to_fragment: Option<u64>,
    #[serde(default)]
    pub encapsulation: Vec<EncapsulationEntry>,
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub timestamps: TimestampsConfig,
}

/// `fragmentation_probability` accepts either a bare `0..1` float or a
/// `"xx%"` string.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityValue(pub f64);

impl<'de> Deserialize<'de> for ProbabilityValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }
        let repr = Repr::deserialize(deserializer)?;
        let value = match repr {
            Repr::Number(n) => n,
            Repr::Text(s) => {
                if let Some(stripped) = s.strip_suffix('%') {
                    stripped.trim().parse::<f64>().map_err(serde::de::Error::custom)? / 100.0
                } else {
                    s.trim().parse::<f64>().map_err(serde::de::Error::custom)?
                }
            }
        };
        Ok(ProbabilityValue(value))
    }
}

fn parse_duration_ns(text: &str) -> Option<u64> {
    let text = text.trim();
    let (number_part, unit) = text
        .find(|c: char| c.is_alphabetic())
        .map(|idx| text.split_at(idx))
        .unwrap_or((text, "ns"));
    let value: f64 = number_part.trim().parse().ok()?;
    let multiplier: f64 = match unit.trim() {
        "ns" => 1.0,
        "us" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" => 1_000_000_000.0,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

impl TimestampsConfig {
    pub fn flow_max_interpacket_gap_ns(&self) -> Option<u64> {
        self.flow_max_interpacket_gap.as_deref().and_then(parse_duration_ns)
    }
    pub fn min_packet_gap_ns(&self) -> Option<u64> {
        self.min_packet_gap.as_deref().and_then(parse_duration_ns)
    }
}

/// Validates and parses a generator YAML config file. Any key not covered
/// by the schema above produces a [`ConfigError::UnknownKey`] via
/// `serde_yaml`'s `deny_unknown_fields` diagnostics.
pub fn load_config(path: &Path) -> Result<GeneratorConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Malformed { source: e.to_string() })?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<GeneratorConfigFile, ConfigError> {
    serde_yaml::from_str(text).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("unknown field") {
            ConfigError::UnknownKey {
                path: msg.clone(),
                line: e.location().map(|l| l.line()),
            }
        } else {
            ConfigError::Malformed { source: msg }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
ipv4:
  ip_range: 10.0.0.0/8
fragmentation_probability: "5%"
min_packet_size_to_fragment: 1000
"#;
        let cfg = parse_config(yaml).unwrap();
        assert_eq!(cfg.ipv4.ip_range.as_deref(), Some("10.0.0.0/8"));
        assert!((cfg.fragmentation_probability.unwrap().0 - 0.05).abs() < 1e-9);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let yaml = "not_a_real_key: 1\n";
        let err = parse_config(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { .. }));
    }

    #[test]
    fn parses_duration_suffixes() {
        assert_eq!(parse_duration_ns("10s"), Some(10_000_000_000));
        assert_eq!(parse_duration_ns("500ms"), Some(500_000_000));
    }
}
