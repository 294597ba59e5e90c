//! Pcap-file output backend: "mechanically simpler" per its own design note,
//! used for offline testing and for recording a replay run's actual wire
//! bytes without needing a NIC.

use super::{OutputBackend, OutputQueue, OffloadGrant, OffloadRequest, QueueStats};
use crate::error::ReplayError;
use crate::generator::pcap::PcapWriter;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

pub struct PcapFileQueue {
    writer: PcapWriter,
    stats: QueueStats,
}

impl OutputQueue for PcapFileQueue {
    fn acquire(&mut self, frame_count: usize) -> Result<usize, ReplayError> {
        Ok(frame_count.min(self.max_burst_size()))
    }

    fn commit_burst(&mut self, frames: &[Vec<u8>]) -> Result<usize, ReplayError> {
        let ts = now_ns();
        if self.stats.tx_pkts == 0 {
            self.stats.start_ts = ts;
        }
        for bytes in frames {
            self.writer.write_packet(ts, bytes).map_err(|e| ReplayError::ResourceAcquisition(e.to_string()))?;
            self.stats.tx_pkts += 1;
            self.stats.tx_bytes += bytes.len() as u64;
        }
        self.stats.end_ts = ts;
        Ok(frames.len())
    }

    fn max_burst_size(&self) -> usize {
        1024
    }

    fn flush(&mut self) -> Result<(), ReplayError> {
        self.writer.flush().map_err(|e| ReplayError::ResourceAcquisition(e.to_string()))
    }

    fn stats(&self) -> QueueStats {
        self.stats
    }
}

/// A single-queue backend: there's no hardware queue fan-out when the
/// "wire" is a file.
pub struct PcapFileBackend {
    queue: PcapFileQueue,
}

impl PcapFileBackend {
    pub fn create(path: &Path) -> Result<Self, ReplayError> {
        let writer = PcapWriter::create(path).map_err(|e| ReplayError::ResourceAcquisition(e.to_string()))?;
        Ok(PcapFileBackend { queue: PcapFileQueue { writer, stats: QueueStats::default() } })
    }
}

impl OutputBackend for PcapFileBackend {
    fn queue_count(&self) -> usize {
        1
    }

    fn get_queue(&mut self, id: usize) -> Result<&mut dyn OutputQueue, ReplayError> {
        if id != 0 {
            return Err(ReplayError::ResourceAcquisition(format!("pcap file backend has only queue 0, got {id}")));
        }
        Ok(&mut self.queue)
    }

    fn mtu(&self) -> usize {
        65535
    }

    fn numa_node(&self) -> Option<u32> {
        None
    }

    fn configure_offloads(&mut self, _requests: OffloadRequest) -> OffloadGrant {
        OffloadGrant::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_committed_frames_to_file() {
        let path = std::env::temp_dir().join(format!("flowforge-replay-pcap-test-{}.pcap", std::process::id()));
        {
            let mut backend = PcapFileBackend::create(&path).unwrap();
            let queue = backend.get_queue(0).unwrap();
            let n = queue.acquire(2).unwrap();
            let frames = vec![vec![1u8; 40], vec![2u8; 60]];
            queue.commit_burst(&frames[..n]).unwrap();
            queue.flush().unwrap();
            assert_eq!(queue.stats().tx_pkts, 2);
        }
        let data = std::fs::read(&path).unwrap();
        assert!(data.len() > 24);
        let _ = std::fs::remove_file(&path);
    }
}
