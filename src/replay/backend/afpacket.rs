//! AF_PACKET v2 TX-ring backend: `PF_PACKET`/`SOCK_RAW` socket bound to an
//! interface index, `PACKET_TX_RING` mmap'd in blocks, `QDISC_BYPASS` and an
//! optional `PACKET_LOSS` toggle for malformed-frame tolerance.

use super::{OutputBackend, OutputQueue, OffloadGrant, OffloadRequest, QueueStats};
use crate::error::ReplayError;
use std::mem;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// `tpacket_hdr` status bits (see `linux/if_packet.h`).
mod status {
    pub const TP_STATUS_AVAILABLE: u32 = 0;
    pub const TP_STATUS_SEND_REQUEST: u32 = 1;
    pub const TP_STATUS_WRONG_FORMAT: u32 = 4;
}

pub struct AfPacketConfig {
    pub ifname: String,
    pub frame_size: u32,
    pub frame_count: u32,
    pub block_size: u32,
    pub qdisc_bypass: bool,
    pub packet_loss: bool,
}

struct TxRing {
    map: *mut libc::c_void,
    map_len: usize,
    frame_size: u32,
    frame_count: u32,
    cursor: u32,
}

// Safety: the ring is only ever touched from the queue that owns it; no
// concurrent access occurs because `OutputQueue::acquire`/`commit_burst`
// take `&mut self`.
unsafe impl Send for TxRing {}

impl TxRing {
    fn frame_ptr(&self, idx: u32) -> *mut u8 {
        unsafe { (self.map as *mut u8).add((idx * self.frame_size) as usize) }
    }

    fn tpacket_hdr_status(&self, idx: u32) -> u32 {
        unsafe { *(self.frame_ptr(idx) as *const u32) }
    }

    fn set_tpacket_hdr_status(&mut self, idx: u32, status: u32) {
        unsafe {
            *(self.frame_ptr(idx) as *mut u32) = status;
        }
    }

    /// `tpacket_hdr` has `tp_len`/`tp_snaplen` as the next two `u32` fields.
    fn set_frame_payload(&mut self, idx: u32, bytes: &[u8]) {
        let hdr_len = 4 * mem::size_of::<u32>(); // status, len, snaplen, mac offset (layout simplified)
        let payload_offset = hdr_len.max(mem::size_of::<libc::tpacket_hdr>());
        unsafe {
            let base = self.frame_ptr(idx);
            let hdr = base as *mut libc::tpacket_hdr;
            (*hdr).tp_len = bytes.len() as u32;
            (*hdr).tp_snaplen = bytes.len() as u32;
            let dst = base.add(payload_offset);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }
    }
}

impl Drop for TxRing {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.map, self.map_len);
        }
    }
}

pub struct AfPacketQueue {
    fd: RawFd,
    ring: TxRing,
    packet_loss: bool,
    stats: QueueStats,
}

impl OutputQueue for AfPacketQueue {
    fn acquire(&mut self, frame_count: usize) -> Result<usize, ReplayError> {
        Ok(frame_count.min(self.max_burst_size()))
    }

    fn commit_burst(&mut self, frames: &[Vec<u8>]) -> Result<usize, ReplayError> {
        let mut submitted = 0;
        for bytes in frames {
            let idx = self.ring.cursor % self.ring.frame_count;
            let status = self.ring.tpacket_hdr_status(idx);
            if status == status::TP_STATUS_WRONG_FORMAT {
                if self.packet_loss {
                    self.stats.failed_pkts += 1;
                    self.ring.cursor = self.ring.cursor.wrapping_add(1);
                    continue;
                }
                return Err(ReplayError::ResourceAcquisition(
                    "TX ring frame in TP_STATUS_WRONG_FORMAT and packet_loss tolerance disabled".into(),
                ));
            }
            if status != status::TP_STATUS_AVAILABLE {
                // Ring is backed up; stop here rather than overwrite an
                // in-flight frame.
                break;
            }
            self.ring.set_frame_payload(idx, bytes);
            self.ring.set_tpacket_hdr_status(idx, status::TP_STATUS_SEND_REQUEST);
            self.ring.cursor = self.ring.cursor.wrapping_add(1);
            submitted += 1;
        }

        if submitted > 0 {
            let rc = unsafe { libc::sendto(self.fd, std::ptr::null(), 0, libc::MSG_DONTWAIT, std::ptr::null(), 0) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EAGAIN) {
                    return Err(ReplayError::Io(err));
                }
            }
            self.stats.tx_pkts += submitted as u64;
            self.stats.tx_bytes += frames.iter().take(submitted).map(|f| f.len() as u64).sum::<u64>();
        }
        Ok(submitted)
    }

    fn max_burst_size(&self) -> usize {
        self.ring.frame_count as usize
    }

    fn flush(&mut self) -> Result<(), ReplayError> {
        unsafe {
            libc::sendto(self.fd, std::ptr::null(), 0, 0, std::ptr::null(), 0);
        }
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl Drop for AfPacketQueue {
    fn drop(&mut self) {
        // Drain outstanding TX for up to three seconds so we don't close the
        // socket out from under frames the kernel still has queued.
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            let mut any_pending = false;
            for i in 0..self.ring.frame_count {
                if self.ring.tpacket_hdr_status(i) == status::TP_STATUS_SEND_REQUEST {
                    any_pending = true;
                    break;
                }
            }
            if !any_pending {
                break;
            }
            unsafe {
                libc::sendto(self.fd, std::ptr::null(), 0, 0, std::ptr::null(), 0);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        unsafe {
            libc::close(self.fd);
        }
    }
}

pub struct AfPacketBackend {
    queue: AfPacketQueue,
    mtu: usize,
}

impl AfPacketBackend {
    pub fn open(config: &AfPacketConfig) -> Result<Self, ReplayError> {
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, (libc::ETH_P_ALL as u16).to_be() as i32) };
        if fd < 0 {
            return Err(ReplayError::ResourceAcquisition(format!(
                "socket(AF_PACKET) failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let version = libc::TPACKET_V1 as i32;
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                libc::PACKET_VERSION,
                &version as *const _ as *const libc::c_void,
                mem::size_of::<i32>() as u32,
            )
        };
        if rc < 0 {
            return Err(ReplayError::ResourceAcquisition("setsockopt(PACKET_VERSION) failed".into()));
        }

        if config.qdisc_bypass {
            let one: i32 = 1;
            unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_PACKET,
                    libc::PACKET_QDISC_BYPASS,
                    &one as *const _ as *const libc::c_void,
                    mem::size_of::<i32>() as u32,
                );
            }
        }

        let req = libc::tpacket_req {
            tp_block_size: config.block_size,
            tp_block_nr: (config.frame_count * config.frame_size) / config.block_size,
            tp_frame_size: config.frame_size,
            tp_frame_nr: config.frame_count,
        };
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                libc::PACKET_TX_RING,
                &req as *const _ as *const libc::c_void,
                mem::size_of::<libc::tpacket_req>() as u32,
            )
        };
        if rc < 0 {
            return Err(ReplayError::ResourceAcquisition(format!(
                "setsockopt(PACKET_TX_RING) failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let map_len = (req.tp_block_size * req.tp_block_nr) as usize;
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(ReplayError::ResourceAcquisition(format!(
                "mmap(PACKET_TX_RING) failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let ifindex = interface_index(&config.ifname)
            .ok_or_else(|| ReplayError::ResourceAcquisition(format!("unknown interface '{}'", config.ifname)))?;
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        addr.sll_ifindex = ifindex;
        let rc = unsafe {
            libc::bind(fd, &addr as *const _ as *const libc::sockaddr, mem::size_of::<libc::sockaddr_ll>() as u32)
        };
        if rc < 0 {
            return Err(ReplayError::ResourceAcquisition(format!("bind() failed: {}", std::io::Error::last_os_error())));
        }

        let ring = TxRing { map, map_len, frame_size: config.frame_size, frame_count: config.frame_count, cursor: 0 };
        Ok(AfPacketBackend {
            queue: AfPacketQueue { fd, ring, packet_loss: config.packet_loss, stats: QueueStats::default() },
            mtu: 1500,
        })
    }
}

fn interface_index(ifname: &str) -> Option<i32> {
    let cname = std::ffi::CString::new(ifname).ok()?;
    let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if idx == 0 { None } else { Some(idx as i32) }
}

impl OutputBackend for AfPacketBackend {
    fn queue_count(&self) -> usize {
        1
    }

    fn get_queue(&mut self, id: usize) -> Result<&mut dyn OutputQueue, ReplayError> {
        if id != 0 {
            return Err(ReplayError::ResourceAcquisition(format!("AF_PACKET backend has only queue 0, got {id}")));
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
