//! Plain raw socket output: no ring, no mmap, one `sendto()` per packet.
//! "Mechanically simpler; treat as interface-only" — exists so a replay
//! config can target a plugin name without AF_PACKET's TX-ring ceremony.

use super::{OutputBackend, OutputQueue, OffloadGrant, OffloadRequest, QueueStats};
use crate::error::ReplayError;
use std::mem;
use std::os::fd::RawFd;

pub struct RawSocketQueue {
    fd: RawFd,
    ifindex: i32,
    stats: QueueStats,
}

impl RawSocketQueue {
    fn send_one(&mut self, bytes: &[u8]) -> Result<(), ReplayError> {
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        addr.sll_ifindex = self.ifindex;
        addr.sll_halen = 6;

        let rc = unsafe {
            libc::sendto(
                self.fd,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
                libc::MSG_DONTWAIT,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if rc < 0 {
            self.stats.failed_pkts += 1;
            return Err(ReplayError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl OutputQueue for RawSocketQueue {
    fn acquire(&mut self, frame_count: usize) -> Result<usize, ReplayError> {
        Ok(frame_count.min(self.max_burst_size()))
    }

    fn commit_burst(&mut self, frames: &[Vec<u8>]) -> Result<usize, ReplayError> {
        let mut sent = 0;
        for bytes in frames {
            if self.send_one(bytes).is_ok() {
                self.stats.tx_pkts += 1;
                self.stats.tx_bytes += bytes.len() as u64;
                sent += 1;
            }
        }
        Ok(sent)
    }

    fn max_burst_size(&self) -> usize {
        64
    }

    fn flush(&mut self) -> Result<(), ReplayError> {
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl Drop for RawSocketQueue {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

pub struct RawSocketBackend {
    queue: RawSocketQueue,
    mtu: usize,
}

impl RawSocketBackend {
    pub fn open(ifname: &str) -> Result<Self, ReplayError> {
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, (libc::ETH_P_ALL as u16).to_be() as i32) };
        if fd < 0 {
            return Err(ReplayError::ResourceAcquisition(format!(
                "socket(AF_PACKET, SOCK_RAW) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let ifindex = interface_index(ifname)
            .ok_or_else(|| ReplayError::ResourceAcquisition(format!("unknown interface '{ifname}'")))?;
        Ok(RawSocketBackend {
            queue: RawSocketQueue { fd, ifindex, stats: QueueStats::default() },
            mtu: 1500,
        })
    }
}

fn interface_index(ifname: &str) -> Option<i32> {
    let cname = std::ffi::CString::new(ifname).ok()?;
    let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if idx == 0 { None } else { Some(idx as i32) }
}

impl OutputBackend for RawSocketBackend {
    fn queue_count(&self) -> usize {
        1
    }

    fn get_queue(&mut self, id: usize) -> Result<&mut dyn OutputQueue, ReplayError> {
        if id != 0 {
            return Err(ReplayError::ResourceAcquisition(format!("raw socket backend has only queue 0, got {id}")));
        }
        Ok(&mut self.queue)
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn numa_node(&self) -> Option<u32> {
        None
    }

    fn configure_offloads(&mut self, _requests: OffloadRequest) -> OffloadGrant {
        OffloadGrant::default()
    }
}
