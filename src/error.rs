//! Error types for every subsystem boundary.
//!
//! Each enum here covers one failure classification from the error handling
//! design: configuration errors are fatal at parse time, resource-acquisition
//! and programming-misuse errors are fatal at startup/construction, and
//! runtime-transient failures are recovered locally rather than raised at
//! all (see [`crate::replay::backend`] for where those are just logged).

use std::fmt;

/// Errors raised while parsing or validating a YAML/CSV configuration file.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A top-level or nested key isn't recognized by the schema.
    UnknownKey {
        /// Dotted path to the offending key, e.g. `"timestamps.link_spede"`.
        path: String,
        /// Line the key appeared on, if the underlying parser reported one.
        line: Option<usize>,
    },
    /// A value failed a semantic check (e.g. probability out of `[0,1]`).
    InvalidValue {
        path: String,
        reason: String,
    },
    /// The YAML or CSV document itself didn't parse.
    Malformed {
        source: String,
    },
    /// A replay output plugin name wasn't recognized.
    UnknownPlugin {
        name: String,
    },
    /// A replicator strategy string didn't match the expected grammar.
    BadStrategy {
        strategy: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownKey { path, line } => match line {
                Some(l) => write!(f, "unknown configuration key '{path}' at line {l}"),
                None => write!(f, "unknown configuration key '{path}'"),
            },
            ConfigError::InvalidValue { path, reason } => {
                write!(f, "invalid value for '{path}': {reason}")
            }
            ConfigError::Malformed { source } => write!(f, "malformed configuration: {source}"),
            ConfigError::UnknownPlugin { name } => write!(f, "unknown output plugin '{name}'"),
            ConfigError::BadStrategy { strategy } => {
                write!(f, "malformed replication strategy '{strategy}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from the flow generator's end-to-end pipeline.
#[derive(Debug)]
pub enum GeneratorError {
    /// A profile row failed basic validation (`start > end`, zero packets).
    InvalidProfileRow {
        row: usize,
        reason: String,
    },
    /// The pcap output file could not be created or written.
    PcapWrite(std::io::Error),
    /// Every collision retry attempt was exhausted for a flow's 5-tuple.
    CollisionExhausted {
        attempts: u32,
        tuple: String,
    },
    Config(ConfigError),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::InvalidProfileRow { row, reason } => {
                write!(f, "profile row {row} is invalid: {reason}")
            }
            GeneratorError::PcapWrite(e) => write!(f, "failed writing pcap output: {e}"),
            GeneratorError::CollisionExhausted { attempts, tuple } => write!(
                f,
                "could not find a unique 5-tuple after {attempts} attempts (last: {tuple})"
            ),
            GeneratorError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for GeneratorError {}

impl From<ConfigError> for GeneratorError {
    fn from(e: ConfigError) -> Self {
        GeneratorError::Config(e)
    }
}

impl From<std::io::Error> for GeneratorError {
    fn from(e: std::io::Error) -> Self {
        GeneratorError::PcapWrite(e)
    }
}

/// Programming-misuse errors surfaced while constructing or planning a
/// flow's layer stack. These indicate a bug, not a transient condition.
#[derive(Debug, Clone)]
pub enum LayerError {
    /// The requested L3/L4 combination has no supported layer stack.
    UnsupportedProtocolCombination { l3: u8, l4: u8 },
    /// A Vlan layer was requested after an Mpls layer in the same stack.
    VlanAfterMpls,
    /// A layer's `Build` was invoked before its `PlanFlow` ran.
    BuildBeforePlan,
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerError::UnsupportedProtocolCombination { l3, l4 } => {
                write!(f, "unsupported l3={l3}/l4={l4} protocol combination")
            }
            LayerError::VlanAfterMpls => write!(f, "a Vlan layer cannot follow an Mpls layer"),
            LayerError::BuildBeforePlan => write!(f, "layer Build invoked before PlanFlow"),
        }
    }
}

impl std::error::Error for LayerError {}

/// Errors from the replay engine's packet pipeline and output backends.
#[derive(Debug)]
pub enum ReplayError {
    /// A resource could not be acquired (bind, mmap, UMEM allocation, ...).
    ResourceAcquisition(String),
    /// A backend method requires capabilities this build/platform doesn't
    /// have (e.g. DPDK/NFB without their respective hardware/SDK).
    Unsupported(String),
    /// An output queue's acquire/commit type-state contract was violated.
    DoubleAcquire,
    /// Underlying I/O failure (socket, file).
    Io(std::io::Error),
    Config(ConfigError),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::ResourceAcquisition(s) => write!(f, "resource acquisition failed: {s}"),
            ReplayError::Unsupported(s) => write!(f, "unsupported in this build: {s}"),
            ReplayError::DoubleAcquire => {
                write!(f, "acquireBurst called while a previous burst is still uncommitted")
            }
            ReplayError::Io(e) => write!(f, "I/O error: {e}"),
            ReplayError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<std::io::Error> for ReplayError {
    fn from(e: std::io::Error) -> Self {
        ReplayError::Io(e)
    }
}

impl From<ConfigError> for ReplayError {
    fn from(e: ConfigError) -> Self {
        ReplayError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        let e = ConfigError::UnknownKey { path: "foo.bar".into(), line: Some(12) };
        assert_eq!(e.to_string(), "unknown configuration key 'foo.bar' at line 12");

        let e = LayerError::VlanAfterMpls;
        assert_eq!(e.to_string(), "a Vlan layer cannot follow an Mpls layer");
    }
}
