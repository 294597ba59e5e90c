//! Common output backend contract: every transmit plugin (AF_PACKET, AF_XDP,
//! DPDK, NFB, raw socket, pcap file) exposes the same queue-oriented surface
//! so the replay loop never branches on which one it's talking to.

#[cfg(target_os = "linux")]
pub mod afpacket;
#[cfg(target_os = "linux")]
pub mod afxdp;
pub mod dpdk;
pub mod nfb;
pub mod pcapfile;
#[cfg(target_os = "linux")]
pub mod rawsocket;

use crate::error::ReplayError;

/// One packet handed to [`OutputQueue::acquire`]/fill/commit.
#[derive(Debug, Clone, Copy)]
pub struct OffloadRequest {
    pub checksum_offload: bool,
    pub super_packets: bool,
}

/// What a backend actually granted, which may be a subset of what was asked
/// for (e.g. an NFB firmware image without `frame_unpacker` loaded).
#[derive(Debug, Clone, Copy, Default)]
pub struct OffloadGrant {
    pub checksum_offload: bool,
    pub super_packets: bool,
}

/// Counters a queue reports at teardown (and may report earlier for live
/// diagnostics). `start_ts`/`end_ts` are nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub tx_pkts: u64,
    pub tx_bytes: u64,
    pub failed_pkts: u64,
    pub upscaled_pkts: u64,
    pub start_ts: u64,
    pub end_ts: u64,
}

/// A burst of `frame_count` frame slots reserved from the ring, not yet
/// filled or submitted. The type parameter ties the borrow to the queue it
/// came from so a second `acquire()` before this is committed is a borrow-
/// checker error, not a runtime one.
pub struct AcquiredBurst<'a> {
    queue: &'a mut dyn OutputQueue,
    filled: Vec<Vec<u8>>,
    frame_count: usize,
}

impl<'a> AcquiredBurst<'a> {
    pub fn new(queue: &'a mut dyn OutputQueue, frame_count: usize) -> Self {
        AcquiredBurst { queue, filled: Vec::with_capacity(frame_count), frame_count }
    }

    /// Appends one packet's bytes to the burst. Panics (a programming-misuse
    /// bug, per the error design) if called more times than `frame_count`.
    pub fn fill(&mut self, bytes: &[u8]) {
        assert!(
            self.filled.len() < self.frame_count,
            "fill() called more times than the burst's acquired frame_count"
        );
        self.filled.push(bytes.to_vec());
    }

    pub fn remaining(&self) -> usize {
        self.frame_count - self.filled.len()
    }

    /// Submits every filled frame to the backend, consuming the burst so it
    /// cannot be committed twice.
    pub fn commit(self) -> Result<usize, ReplayError> {
        self.queue.commit_burst(&self.filled)
    }
}

/// One transmit queue of an [`OutputBackend`]. Implementors back
/// `acquire`/`commit_burst` with whatever ring/mmap/socket machinery the
/// backend uses; [`AcquiredBurst`] enforces the acquire-then-commit-once
/// contract at the type level for callers.
pub trait OutputQueue {
    /// Reserves up to `frame_count` frame slots (clamped to
    /// [`maxBurstSize`](Self::max_burst_size)).
    fn acquire(&mut self, frame_count: usize) -> Result<usize, ReplayError>;

    /// Used internally by [`AcquiredBurst::commit`]; not meant to be called
    /// directly (call `acquire` then fill the returned [`AcquiredBurst`]).
    fn commit_burst(&mut self, frames: &[Vec<u8>]) -> Result<usize, ReplayError>;

    fn max_burst_size(&self) -> usize;

    /// Forces any buffered frames out immediately rather than waiting for a
    /// full burst.
    fn flush(&mut self) -> Result<(), ReplayError>;

    fn stats(&self) -> QueueStats;
}

/// A transmit-capable device: AF_PACKET socket, AF_XDP UMEM, DPDK port, NFB
/// firmware channel, raw socket, or a pcap file standing in for all of the
/// above during offline testing.
pub trait OutputBackend {
    fn queue_count(&self) -> usize;

    fn get_queue(&mut self, id: usize) -> Result<&mut dyn OutputQueue, ReplayError>;

    fn mtu(&self) -> usize;

    /// `None` when the backend has no NUMA affinity concept (pcap file, raw
    /// socket, ...).
    fn numa_node(&self) -> Option<u32>;

    /// Asks for offloads and returns what was actually granted; a backend
    /// that can't satisfy a request downgrades rather than erroring.
    fn configure_offloads(&mut self, requests: OffloadRequest) -> OffloadGrant;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeQueue {
        max_burst: usize,
        committed: Vec<Vec<u8>>,
    }

    impl OutputQueue for FakeQueue {
        fn acquire(&mut self, frame_count: usize) -> Result<usize, ReplayError> {
            Ok(frame_count.min(self.max_burst))
        }
        fn commit_burst(&mut self, frames: &[Vec<u8>]) -> Result<usize, ReplayError> {
            self.committed.extend(frames.iter().cloned());
            Ok(frames.len())
        }
        fn max_burst_size(&self) -> usize {
            self.max_burst
        }
        fn flush(&mut self) -> Result<(), ReplayError> {
            Ok(())
        }
        fn stats(&self) -> QueueStats {
            QueueStats { tx_pkts: self.committed.len() as u64, ..Default::default() }
        }
    }

    #[test]
    fn burst_fill_then_commit_forwards_frames() {
        let mut q = FakeQueue { max_burst: 4, committed: Vec::new() };
        let granted = q.acquire(2).unwrap();
        let mut burst = AcquiredBurst::new(&mut q, granted);
        burst.fill(&[1, 2, 3]);
        burst.fill(&[4, 5]);
        assert_eq!(burst.remaining(), 0);
        let n = burst.commit().unwrap();
        assert_eq!(n, 2);
        assert_eq!(q.stats().tx_pkts, 2);
    }

    #[test]
    #[should_panic]
    fn overfilling_a_burst_panics() {
        let mut q = FakeQueue { max_burst: 4, committed: Vec::new() };
        let granted = q.acquire(1).unwrap();
        let mut burst = AcquiredBurst::new(&mut q, granted);
        burst.fill(&[1]);
        burst.fill(&[2]);
    }
}
