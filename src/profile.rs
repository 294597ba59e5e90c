//! Profile rows: the generator's primary input, read from a CSV file whose
//! header may list its columns in any order.

use crate::error::GeneratorError;
use std::path::Path;

/// One input row describing the statistics a single flow should match.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub l3_proto: u8,
    pub l4_proto: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub packets_fwd: u64,
    pub bytes_fwd: u64,
    pub packets_rev: u64,
    pub bytes_rev: u64,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
}

impl ProfileRow {
    pub fn validate(&self, row_number: usize) -> Result<(), GeneratorError> {
        if self.start_time_ms > self.end_time_ms {
            return Err(GeneratorError::InvalidProfileRow {
                row: row_number,
                reason: "START_TIME is after END_TIME".into(),
            });
        }
        if self.packets_fwd + self.packets_rev == 0 {
            return Err(GeneratorError::InvalidProfileRow {
                row: row_number,
                reason: "PACKETS + PACKETS_REV must be > 0".into(),
            });
        }
        if self.bytes_fwd + self.bytes_rev == 0 {
            return Err(GeneratorError::InvalidProfileRow {
                row: row_number,
                reason: "BYTES + BYTES_REV must be > 0".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawRow {
    #[serde(rename = "START_TIME")]
    start_time: i64,
    #[serde(rename = "END_TIME")]
    end_time: i64,
    #[serde(rename = "L3_PROTO")]
    l3_proto: u8,
    #[serde(rename = "L4_PROTO")]
    l4_proto: u8,
    #[serde(rename = "SRC_PORT")]
    src_port: u16,
    #[serde(rename = "DST_PORT")]
    dst_port: u16,
    #[serde(rename = "PACKETS")]
    packets: u64,
    #[serde(rename = "BYTES")]
    bytes: u64,
    #[serde(rename = "PACKETS_REV")]
    packets_rev: u64,
    #[serde(rename = "BYTES_REV")]
    bytes_rev: u64,
    #[serde(rename = "SRC_IP")]
    src_ip: Option<String>,
    #[serde(rename = "DST_IP")]
    dst_ip: Option<String>,
}

/// Reads profile rows from a CSV file. The header may list
/// `START_TIME,END_TIME,L3_PROTO,L4_PROTO,SRC_PORT,DST_PORT,PACKETS,BYTES,
/// PACKETS_REV,BYTES_REV` (plus optional `SRC_IP,DST_IP`) in any permutation;
/// comment (`#`) and blank lines are skipped by the `csv` crate's default
/// flexible-header matching.
pub fn load_profiles(path: &Path) -> Result<Vec<ProfileRow>, GeneratorError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)
        .map_err(|e| GeneratorError::Config(crate::error::ConfigError::Malformed { source: e.to_string() }))?;

    let mut rows = Vec::new();
    for (i, result) in reader.deserialize::<RawRow>().enumerate() {
        let raw = result.map_err(|e| {
            GeneratorError::Config(crate::error::ConfigError::Malformed { source: e.to_string() })
        })?;
        let row = ProfileRow {
            start_time_ms: raw.start_time,
            end_time_ms: raw.end_time,
            l3_proto: raw.l3_proto,
            l4_proto: raw.l4_proto,
            src_port: raw.src_port,
            dst_port: raw.dst_port,
            packets_fwd: raw.packets,
            bytes_fwd: raw.bytes,
            packets_rev: raw.packets_rev,
            bytes_rev: raw.bytes_rev,
            src_ip: raw.src_ip,
            dst_ip: raw.dst_ip,
        };
        row.validate(i + 1)?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_start_after_end() {
        let row = ProfileRow {
            start_time_ms: 10,
            end_time_ms: 5,
            l3_proto: 4,
            l4_proto: 6,
            src_port: 1,
            dst_port: 2,
            packets_fwd: 1,
            bytes_fwd: 1,
            packets_rev: 0,
            bytes_rev: 0,
            src_ip: None,
            dst_ip: None,
        };
        assert!(row.validate(1).is_err());
    }

    #[test]
    fn rejects_zero_packets() {
        let row = ProfileRow {
            start_time_ms: 0,
            end_time_ms: 10,
            l3_proto: 4,
            l4_proto: 6,
            src_port: 1,
            dst_port: 2,
            packets_fwd: 0,
            bytes_fwd: 10,
            packets_rev: 0,
            bytes_rev: 0,
            src_ip: None,
            dst_ip: None,
        };
        assert!(row.validate(1).is_err());
    }
}
