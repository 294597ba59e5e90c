//! Classic pcap (not pcapng) file writer, nanosecond-resolution timestamps,
//! `DLT_EN10MB` (Ethernet) link type.

use crate::error::GeneratorError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MAGIC_NANOSECOND: u32 = 0xA1B2_3C4D;
const VERSION_MAJOR: u16 = 2;
const VERSION_MINOR: u16 = 4;
const DLT_EN10MB: u32 = 1;
const SNAPLEN: u32 = 65535;

pub struct PcapWriter {
    out: BufWriter<File>,
}

impl PcapWriter {
    pub fn create(path: &Path) -> Result<Self, GeneratorError> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        out.write_all(&MAGIC_NANOSECOND.to_le_bytes())?;
        out.write_all(&VERSION_MAJOR.to_le_bytes())?;
        out.write_all(&VERSION_MINOR.to_le_bytes())?;
        out.write_all(&0i32.to_le_bytes())?; // thiszone
        out.write_all(&0u32.to_le_bytes())?; // sigfigs
        out.write_all(&SNAPLEN.to_le_bytes())?;
        out.write_all(&DLT_EN10MB.to_le_bytes())?;
        Ok(PcapWriter { out })
    }

    /// Appends one packet record. `timestamp_ns` is nanoseconds since the
    /// Unix epoch.
    pub fn write_packet(&mut self, timestamp_ns: u64, bytes: &[u8]) -> Result<(), GeneratorError> {
        let sec = (timestamp_ns / 1_000_000_000) as u32;
        let nsec = (timestamp_ns % 1_000_000_000) as u32;
        let len = bytes.len() as u32;
        self.out.write_all(&sec.to_le_bytes())?;
        self.out.write_all(&nsec.to_le_bytes())?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), GeneratorError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_global_header_and_one_packet() {
        let path = std::env::temp_dir().join(format!("flowforge-pcap-test-{}.pcap", std::process::id()));
        {
            let mut w = PcapWriter::create(&path).unwrap();
            w.write_packet(1_500_000_000_123_456_789, &[0xAA; 20]).unwrap();
            w.flush().unwrap();
        }
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[0..4], &MAGIC_NANOSECOND.to_le_bytes());
        assert_eq!(data.len(), 24 + 16 + 20);
        let _ = std::fs::remove_file(&path);
    }
}
