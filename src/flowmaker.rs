//! Turns profile rows into planned [`Flow`]s.
//!
//! Address/port assignment and 5-tuple collision checking happen on the
//! calling thread (the generators carry sequential LFSR state that can't be
//! split across workers); the expensive per-flow planning pass — RNG draws
//! for sizes, timestamps, and every layer's plan hooks — is handed off to a
//! bounded worker pool so planning for many flows overlaps. The queue depth
//! (128) bounds how far ahead of calendar admission planning can run.

use crate::addrgen::{MacGenerator, MultiRangeGenerator};
use crate::error::GeneratorError;
use crate::flow::{Flow, FlowPlanningConfig, L3Proto, L4Proto};
use crate::profile::ProfileRow;
use crate::random::Rng;
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

const TRY_COUNT: u32 = 10;
const QUEUE_DEPTH: usize = 128;

/// Address pools a [`FlowMaker`] draws from when a profile row doesn't pin
/// its own `SRC_IP`/`DST_IP`.
pub struct AddressPools {
    pub ipv4: MultiRangeGenerator,
    pub ipv6: MultiRangeGenerator,
    pub mac: MacGenerator,
}

struct PlanJob {
    flow_id: u64,
    l3_proto: L3Proto,
    l4_proto: L4Proto,
    src_ip: Vec<u8>,
    dst_ip: Vec<u8>,
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_port: u16,
    dst_port: u16,
    fwd_pkts: u64,
    rev_pkts: u64,
    fwd_bytes: u64,
    rev_bytes: u64,
    ts_first: u64,
    ts_last: u64,
}

fn tuple_key(l3: L3Proto, l4: L4Proto, src_ip: &[u8], dst_ip: &[u8], src_port: u16, dst_port: u16) -> String {
    format!("{l3:?}/{l4:?}/{src_ip:?}:{src_port}->{dst_ip:?}:{dst_port}")
}

/// Builds, plans, and hands off flows from profile rows, with collision
/// retry and a bounded worker pool for the planning pass itself.
pub struct FlowMaker {
    global_seed: u64,
    pools: AddressPools,
    config: FlowPlanningConfig,
    seen_tuples: HashSet<String>,
    next_flow_id: u64,
    collision_check: bool,
}

impl FlowMaker {
    pub fn new(global_seed: u64, pools: AddressPools, config: FlowPlanningConfig) -> Self {
        FlowMaker {
            global_seed,
            pools,
            config,
            seen_tuples: HashSet::new(),
            next_flow_id: 0,
            collision_check: true,
        }
    }

    /// Disables 5-tuple collision retries (`--no-collision-check`):
    /// duplicate tuples are accepted on the first address/port draw.
    pub fn without_collision_check(mut self) -> Self {
        self.collision_check = false;
        self
    }

    fn assign_addresses(&mut self, row: &ProfileRow, rng: &mut Rng) -> (L3Proto, Vec<u8>, Vec<u8>, [u8; 6], [u8; 6]) {
        let l3_proto = if row.l3_proto == 6 { L3Proto::V6 } else { L3Proto::V4 };
        let src_ip = match &row.src_ip {
            Some(s) => parse_ip_literal(s),
            None => match l3_proto {
                L3Proto::V4 => self.pools.ipv4.next(rng),
                L3Proto::V6 => self.pools.ipv6.next(rng),
            },
        };
        let dst_ip = match &row.dst_ip {
            Some(s) => parse_ip_literal(s),
            None => match l3_proto {
                L3Proto::V4 => self.pools.ipv4.next(rng),
                L3Proto::V6 => self.pools.ipv6.next(rng),
            },
        };
        let src_mac = self.pools.mac.next();
        let dst_mac = self.pools.mac.next();
        (l3_proto, src_ip, dst_ip, src_mac, dst_mac)
    }

    fn l4_proto(row: &ProfileRow) -> L4Proto {
        match row.l4_proto {
            6 => L4Proto::Tcp,
            17 => L4Proto::Udp,
            1 => L4Proto::IcmpEcho,
            58 => L4Proto::Icmpv6Echo,
            _ => L4Proto::Udp,
        }
    }

    /// Resolves one profile row into a collision-free [`PlanJob`], retrying
    /// address/port reassignment up to `TRY_COUNT` times.
    fn resolve_row(&mut self, row: &ProfileRow, _row_number: usize) -> Result<PlanJob, GeneratorError> {
        let flow_id = self.next_flow_id;
        self.next_flow_id += 1;
        let mut rng = Rng::for_flow(self.global_seed, flow_id);
        let l4_proto = Self::l4_proto(row);

        let mut last_key = String::new();
        for attempt in 0..TRY_COUNT {
            let (l3_proto, src_ip, dst_ip, src_mac, dst_mac) = self.assign_addresses(row, &mut rng);
            let src_port = if attempt == 0 { row.src_port } else { rng.uniform_range(1024, 65535) as u16 };
            let dst_port = row.dst_port;
            let key = tuple_key(l3_proto, l4_proto, &src_ip, &dst_ip, src_port, dst_port);
            if !self.collision_check || self.seen_tuples.insert(key.clone()) {
                return Ok(PlanJob {
                    flow_id,
                    l3_proto,
                    l4_proto,
                    src_ip,
                    dst_ip,
                    src_mac,
                    dst_mac,
                    src_port,
                    dst_port,
                    fwd_pkts: row.packets_fwd,
                    rev_pkts: row.packets_rev,
                    fwd_bytes: row.bytes_fwd,
                    rev_bytes: row.bytes_rev,
                    ts_first: (row.start_time_ms.max(0) as u64) * 1_000_000,
                    ts_last: (row.end_time_ms.max(0) as u64) * 1_000_000,
                });
            }
            last_key = key;
        }
        Err(GeneratorError::CollisionExhausted { attempts: TRY_COUNT, tuple: last_key })
    }

    /// Builds a layer stack appropriate for a job's L3/L4 combination.
    fn build_layers(job: &PlanJob, config: &FlowPlanningConfig, rng: &mut Rng) -> Vec<crate::layers::Layer> {
        use crate::layers::Layer;
        const ETHERTYPE_IPV4: u16 = 0x0800;
        const ETHERTYPE_IPV6: u16 = 0x86DD;
        const PROTO_ICMP: u8 = 1;
        const PROTO_TCP: u8 = 6;
        const PROTO_UDP: u8 = 17;
        const PROTO_ICMPV6: u8 = 58;

        let l4_protocol_number = match job.l4_proto {
            L4Proto::Tcp => PROTO_TCP,
            L4Proto::Udp => PROTO_UDP,
            L4Proto::IcmpEcho | L4Proto::IcmpRandom => PROTO_ICMP,
            L4Proto::Icmpv6Echo | L4Proto::Icmpv6Random => PROTO_ICMPV6,
        };

        let mut layers = Vec::new();
        let ethertype = match job.l3_proto {
            L3Proto::V4 => ETHERTYPE_IPV4,
            L3Proto::V6 => ETHERTYPE_IPV6,
        };
        layers.push(Layer::Ethernet(crate::layers::ethernet::Ethernet::new(job.src_mac, job.dst_mac, ethertype)));
        match job.l3_proto {
            L3Proto::V4 => {
                let src: [u8; 4] = job.src_ip.clone().try_into().unwrap_or([0; 4]);
                let dst: [u8; 4] = job.dst_ip.clone().try_into().unwrap_or([0; 4]);
                layers.push(Layer::Ipv4(crate::layers::ipv4::Ipv4::new(src, dst, l4_protocol_number)));
            }
            L3Proto::V6 => {
                let src: [u8; 16] = job.src_ip.clone().try_into().unwrap_or([0; 16]);
                let dst: [u8; 16] = job.dst_ip.clone().try_into().unwrap_or([0; 16]);
                layers.push(Layer::Ipv6(crate::layers::ipv6::Ipv6::new(src, dst, l4_protocol_number)));
            }
        }
        match job.l4_proto {
            L4Proto::Tcp => layers.push(Layer::Tcp(crate::layers::tcp::Tcp::new(job.src_port, job.dst_port, rng))),
            L4Proto::Udp => layers.push(Layer::Udp(crate::layers::udp::Udp::new(job.src_port, job.dst_port))),
            L4Proto::IcmpEcho => layers.push(Layer::IcmpEcho(crate::layers::icmp::IcmpEcho::new(rng))),
            L4Proto::IcmpRandom => layers.push(Layer::IcmpRandom(crate::layers::icmp::IcmpRandom::new(rng))),
            L4Proto::Icmpv6Echo => layers.push(Layer::Icmpv6Echo(crate::layers::icmp::Icmpv6Echo::new(rng))),
            L4Proto::Icmpv6Random => layers.push(Layer::Icmpv6Random(crate::layers::icmp::Icmpv6Random::new(rng))),
        }
        if matches!(job.l4_proto, L4Proto::Tcp | L4Proto::Udp) {
            if config.enable_dns && (job.dst_port == 53 || job.src_port == 53) {
                layers.push(Layer::Dns(crate::layers::dns::Dns::new(matches!(job.l3_proto, L3Proto::V6))));
            } else if config.enable_http && (job.dst_port == 80 || job.src_port == 80) {
                layers.push(Layer::Http(crate::layers::http::Http));
            } else {
                layers.push(Layer::Payload(crate::layers::payload::Payload));
            }
        }
        layers
    }

    fn plan_job(job: PlanJob, global_seed: u64, config: FlowPlanningConfig) -> Flow {
        let mut rng = Rng::for_flow(global_seed, job.flow_id);
        let layers = Self::build_layers(&job, &config, &mut rng);
        let mut flow = Flow::new(
            job.flow_id,
            job.l3_proto,
            job.l4_proto,
            job.src_ip,
            job.dst_ip,
            job.src_mac,
            job.dst_mac,
            job.src_port,
            job.dst_port,
            job.fwd_pkts,
            job.rev_pkts,
            job.fwd_bytes,
            job.rev_bytes,
            job.ts_first,
            job.ts_last,
            config,
            &mut rng,
        );
        flow.layers = layers;
        flow.plan(&mut rng);
        flow
    }

    /// Plans every row in `rows`, calling `on_flow` as each planned flow
    /// comes back from the worker pool (not necessarily in row order).
    pub fn run(&mut self, rows: Vec<ProfileRow>, mut on_flow: impl FnMut(Flow)) -> Result<(), GeneratorError> {
        let worker_count = thread::available_parallelism().map(|n| n.get()).unwrap_or(4).min(8);
        let (job_tx, job_rx) = mpsc::sync_channel::<PlanJob>(QUEUE_DEPTH);
        let (flow_tx, flow_rx) = mpsc::channel::<Flow>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let global_seed = self.global_seed;
        let config = self.config.clone();

        let mut handles = Vec::new();
        for _ in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let flow_tx = flow_tx.clone();
            let config = config.clone();
            handles.push(thread::spawn(move || loop {
                let job = {
                    let rx = job_rx.lock().expect("flowmaker job queue poisoned");
                    rx.recv()
                };
                match job {
                    Ok(job) => {
                        let flow = Self::plan_job(job, global_seed, config.clone());
                        if flow_tx.send(flow).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }));
        }
        drop(flow_tx);

        let total_rows = rows.len();
        for (i, row) in rows.into_iter().enumerate() {
            let job = self.resolve_row(&row, i + 1)?;
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);

        let mut received = 0;
        while received < total_rows {
            match flow_rx.recv() {
                Ok(flow) => {
                    on_flow(flow);
                    received += 1;
                }
                Err(_) => break,
            }
        }
        for h in handles {
            let _ = h.join();
        }
        Ok(())
    }
}

fn parse_ip_literal(s: &str) -> Vec<u8> {
    if let Ok(v4) = s.parse::<std::net::Ipv4Addr>() {
        return v4.octets().to_vec();
    }
    if let Ok(v6) = s.parse::<std::net::Ipv6Addr>() {
        return v6.octets().to_vec();
    }
    log::warn!("profile row address '{s}' did not parse as IPv4 or IPv6; using zero address");
    vec![0, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrgen::PrefixedGenerator;

    fn make_pools() -> AddressPools {
        let mut rng = Rng::new(1);
        AddressPools {
            ipv4: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![10, 0, 0, 0], 8, &mut rng)]),
            ipv6: MultiRangeGenerator::new(vec![PrefixedGenerator::new(vec![0xfd; 16], 16, &mut rng)]),
            mac: MacGenerator::new([0x02, 0, 0, 0, 0, 0], 8, &mut rng),
        }
    }

    fn make_row() -> ProfileRow {
        ProfileRow {
            start_time_ms: 0,
            end_time_ms: 1000,
            l3_proto: 4,
            l4_proto: 6,
            src_port: 1234,
            dst_port: 80,
            packets_fwd: 3,
            bytes_fwd: 300,
            packets_rev: 2,
            bytes_rev: 200,
            src_ip: None,
            dst_ip: None,
        }
    }

    #[test]
    fn resolves_distinct_rows_without_collision() {
        let mut maker = FlowMaker::new(1, make_pools(), FlowPlanningConfig::default());
        let job1 = maker.resolve_row(&make_row(), 1).unwrap();
        let job2 = maker.resolve_row(&make_row(), 2).unwrap();
        assert_ne!(job1.flow_id, job2.flow_id);
    }

    #[test]
    fn run_plans_every_row() {
        let mut maker = FlowMaker::new(2, make_pools(), FlowPlanningConfig::default());
        let rows = vec![make_row(), make_row(), make_row()];
        let mut planned = Vec::new();
        maker.run(rows, |flow| planned.push(flow)).unwrap();
        assert_eq!(planned.len(), 3);
        for flow in &planned {
            assert!(!flow.packets.is_empty());
        }
    }
}
