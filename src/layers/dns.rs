//! DNS layer: plans a request/response exchange whose on-wire size matches
//! the packets' planned byte envelope, falling back to random payload when
//! no valid record mix fits.

use crate::domainname;
use crate::flow::Flow;
use crate::layers::{BuildingPacket, Direction, LayerOps, PlannedPacket};
use crate::random::Rng;

const HEADER_LEN: u64 = 12;
const MIN_QUERY_NAME_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordStrategy {
    AddressCompressed,
    Cname,
    Txt(u32),
}

#[derive(Debug, Clone, Default)]
pub struct Dns {
    is_v6: bool,
}

impl Dns {
    pub fn new(is_v6: bool) -> Self {
        Dns { is_v6 }
    }

    fn answer_rdata_len(&self) -> u64 {
        if self.is_v6 { 16 } else { 4 }
    }

    fn choose_strategy(&self, response_budget: u64) -> Option<RecordStrategy> {
        let fixed_answer_overhead = 2 + 2 + 2 + 4 + 2; // name-ptr, type, class, ttl, rdlength
        if response_budget >= fixed_answer_overhead + self.answer_rdata_len() {
            return Some(RecordStrategy::AddressCompressed);
        }
        if response_budget >= fixed_answer_overhead + 2 {
            // A CNAME record's rdata is itself a (possibly compressed) name;
            // cheapest case is a 2-byte pointer.
            return Some(RecordStrategy::Cname);
        }
        if response_budget >= fixed_answer_overhead {
            let records = ((response_budget - fixed_answer_overhead) / fixed_answer_overhead).max(1) as u32;
            return Some(RecordStrategy::Txt(records));
        }
        None
    }

    /// Appends the answer section chosen by `choose_strategy` to `body` and
    /// returns how many answer records were actually written, so the caller
    /// can set ANCOUNT to match reality rather than assume one record.
    fn build_answers(&self, body: &mut Vec<u8>, strategy: RecordStrategy, qtype: u16, budget: u64, rng: &mut Rng) -> u16 {
        const NAME_PTR: [u8; 2] = [0xC0, 0x0C]; // pointer to the question name at offset 12
        const CNAME_TYPE: u16 = 5;
        const TXT_TYPE: u16 = 16;

        match strategy {
            RecordStrategy::AddressCompressed => {
                let rdlen = self.answer_rdata_len() as u16;
                body.extend_from_slice(&NAME_PTR);
                body.extend_from_slice(&qtype.to_be_bytes());
                body.extend_from_slice(&1u16.to_be_bytes()); // IN class
                body.extend_from_slice(&300u32.to_be_bytes()); // ttl
                body.extend_from_slice(&rdlen.to_be_bytes());
                body.extend(rng.random_bytes(rdlen as usize));
                1
            }
            RecordStrategy::Cname => {
                body.extend_from_slice(&NAME_PTR);
                body.extend_from_slice(&CNAME_TYPE.to_be_bytes());
                body.extend_from_slice(&1u16.to_be_bytes());
                body.extend_from_slice(&300u32.to_be_bytes());
                body.extend_from_slice(&2u16.to_be_bytes()); // rdata is itself a compressed pointer
                body.extend_from_slice(&NAME_PTR);
                1
            }
            RecordStrategy::Txt(n) => {
                let fixed_per_record = 2 + 2 + 2 + 4 + 2; // ptr, type, class, ttl, rdlength
                let n = n.max(1) as u64;
                let mut text_budget = budget.saturating_sub(fixed_per_record * n);
                let mut written = 0u16;
                for i in 0..n {
                    let is_last = i + 1 == n;
                    let share = if is_last { text_budget } else { text_budget / (n - i) };
                    let text_len = share.min(254) as usize; // 1-byte length prefix caps a TXT string at 255
                    text_budget = text_budget.saturating_sub(share);

                    body.extend_from_slice(&NAME_PTR);
                    body.extend_from_slice(&TXT_TYPE.to_be_bytes());
                    body.extend_from_slice(&1u16.to_be_bytes());
                    body.extend_from_slice(&300u32.to_be_bytes());
                    let rdlen = (1 + text_len) as u16;
                    body.extend_from_slice(&rdlen.to_be_bytes());
                    body.push(text_len as u8);
                    body.extend(rng.random_bytes(text_len));
                    written += 1;
                }
                written
            }
        }
    }
}

impl LayerOps for Dns {
    fn plan_flow(&mut self, _flow: &mut Flow, _rng: &mut Rng) {
        // Header accounting happens lazily per exchange in post_plan_flow,
        // since query/response sizing depends on the whole run.
    }

    fn post_plan_flow(&mut self, flow: &mut Flow, rng: &mut Rng) {
        let mut infeasible_any = false;
        let mut i = 0;
        while i + 1 < flow.packets.len() {
            if flow.packets[i].is_extra || flow.packets[i + 1].is_extra {
                i += 1;
                continue;
            }
            let (query_idx, response_idx) = if flow.packets[i].direction == Direction::Forward
                && flow.packets[i + 1].direction == Direction::Reverse
            {
                (i, i + 1)
            } else {
                i += 1;
                continue;
            };

            flow.packets[query_idx].size += HEADER_LEN;
            let response_budget = flow.packets[response_idx].size;
            flow.packets[response_idx].size += HEADER_LEN;

            match self.choose_strategy(response_budget) {
                Some(_) => {}
                None => infeasible_any = true,
            }

            flow.packets[query_idx].is_finished = false;
            flow.packets[response_idx].is_finished = false;
            i += 2;
        }
        if infeasible_any {
            flow.generate_random_payload_instead_of_dns = true;
            log::debug!(
                "flow {}: no DNS record mix fit the planned response size; \
                 falling back to random payload",
                flow.id
            );
        }
        let _ = rng;
    }

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        if planned.size < HEADER_LEN {
            // Not enough room for even a DNS header; caller should have
            // fallen back to Payload already.
            let data = rng.random_bytes(planned.size as usize);
            pkt.append(&data);
            planned.size = 0;
            return;
        }

        let txid: u16 = rng.uniform_u64(u16::MAX as u64) as u16;
        let is_query = planned.direction == Direction::Forward || planned.direction == Direction::Unknown;
        let body_budget = planned.size - HEADER_LEN;

        let mut body = Vec::new();
        let name_len = MIN_QUERY_NAME_LEN.max((body_budget / 2).min(60) as usize);
        let name = domainname::generate(rng, name_len.clamp(4, 60));
        for label in name.split('.') {
            body.push(label.len() as u8);
            body.extend_from_slice(label.as_bytes());
        }
        body.push(0);
        let qtype: u16 = if self.is_v6 { 28 } else { 1 };
        body.extend_from_slice(&qtype.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes()); // IN class

        let mut answer_count: u16 = 0;
        if !is_query {
            let question_len = body.len() as u64;
            let answer_budget = body_budget.saturating_sub(question_len);
            if let Some(strategy) = self.choose_strategy(answer_budget) {
                answer_count = self.build_answers(&mut body, strategy, qtype, answer_budget, rng);
            }
        }

        let mut header = vec![0u8; 12];
        header[0..2].copy_from_slice(&txid.to_be_bytes());
        if is_query {
            header[2] = 0x01; // RD
            header[4..6].copy_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        } else {
            header[2] = 0x81; // QR + RD
            header[3] = 0x80; // RA
            header[4..6].copy_from_slice(&1u16.to_be_bytes()); // QDCOUNT
            header[6..8].copy_from_slice(&answer_count.to_be_bytes()); // ANCOUNT
        }

        let mut out = header;
        out.extend_from_slice(&body);
        let target_len = planned.size as usize;
        if out.len() < target_len {
            out.extend(rng.random_bytes(target_len - out.len()));
        } else {
            out.truncate(target_len);
        }
        pkt.append(&out);
        planned.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chooses_address_record_when_room() {
        let dns = Dns::new(false);
        assert_eq!(dns.choose_strategy(40), Some(RecordStrategy::AddressCompressed));
    }

    #[test]
    fn falls_back_to_txt_when_tight() {
        let dns = Dns::new(false);
        assert!(matches!(dns.choose_strategy(14), Some(RecordStrategy::Txt(_)) | None));
    }

    #[test]
    fn build_answers_reports_the_records_it_actually_wrote() {
        let dns = Dns::new(false);
        let mut rng = Rng::new(1);

        let mut body = Vec::new();
        let count = dns.build_answers(&mut body, RecordStrategy::Cname, 1, 14, &mut rng);
        assert_eq!(count, 1);
        assert_eq!(u16::from_be_bytes([body[2], body[3]]), 5); // CNAME type

        let mut body = Vec::new();
        let count = dns.build_answers(&mut body, RecordStrategy::Txt(3), 1, 60, &mut rng);
        assert_eq!(count, 3);
    }

    #[test]
    fn response_build_sets_ancount_to_records_written() {
        let mut dns = Dns::new(false);
        let mut pkt = BuildingPacket::default();
        let mut planned = PlannedPacket::new(0);
        planned.direction = Direction::Reverse;
        planned.size = 60;
        let mut rng = Rng::new(7);
        dns.build(&mut pkt, &mut planned, &mut rng);
        let ancount = u16::from_be_bytes([pkt.bytes[6], pkt.bytes[7]]);
        assert!(ancount >= 1);
    }
}
