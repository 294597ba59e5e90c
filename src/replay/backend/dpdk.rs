//! DPDK output backend: interface-only. Wiring a DPDK poll-mode driver
//! needs EAL initialization and hugepage-backed mempools that only make
//! sense against real hardware and a DPDK SDK install, so this crate
//! expresses the contract and leaves every method returning
//! [`ReplayError::Unsupported`] for a build without the `dpdk` feature.

use super::{OutputBackend, OutputQueue, OffloadGrant, OffloadRequest, QueueStats};
use crate::error::ReplayError;

pub struct DpdkQueue;

impl OutputQueue for DpdkQueue {
    fn acquire(&mut self, _frame_count: usize) -> Result<usize, ReplayError> {
        Err(ReplayError::Unsupported("DPDK support requires building with the dpdk feature and SDK".into()))
    }

    fn commit_burst(&mut self, _frames: &[Vec<u8>]) -> Result<usize, ReplayError> {
        Err(ReplayError::Unsupported("DPDK support requires building with the dpdk feature and SDK".into()))
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

pub struct DpdkBackend {
    queue: DpdkQueue,
}

impl DpdkBackend {
    pub fn open(_port_id: u16) -> Result<Self, ReplayError> {
        Err(ReplayError::Unsupported("DPDK support requires building with the dpdk feature and SDK".into()))
    }
}

impl OutputBackend for DpdkBackend {
    fn queue_count(&self) -> usize {
        0
    }

    fn get_queue(&mut self, _id: usize) -> Result<&mut dyn OutputQueue, ReplayError> {
        Ok(&mut self.queue)
    }

    fn mtu(&self) -> usize {
        1500
    }

    fn numa_node(&self) -> Option<u32> {
        None
    }

    fn configure_offloads(&mut self, _requests: OffloadRequest) -> OffloadGrant {
        OffloadGrant::default()
    }
}
