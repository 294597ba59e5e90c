//! HTTP layer: tags runs of same-direction packets as one logical
//! request/response message and builds a plausible GET/POST/200-OK.

use crate::domainname;
use crate::flow::Flow;
use crate::layers::{BuildingPacket, Direction, HttpMessageKind, LayerOps, PlannedPacket};
use crate::random::Rng;

const HEADER_VOCAB: &[&str] = &["User-Agent", "Accept", "Cache-Control", "Content-Type", "Server"];

#[derive(Debug, Clone, Default)]
pub struct Http;

/// Appends a `Content-Length: <digits>\r\n\r\n` trailer to `head_prefix` such
/// that the full header plus the remaining content adds up to exactly
/// `total` bytes. The header's own length depends on how many digits the
/// content length takes, which depends on the header's length — resolved by
/// fixed-point iteration and padded with spaces on drift, same as the
/// original generator's `CalcAndSetContentLength`.
fn append_content_length(head_prefix: &str, total: u64) -> String {
    const SUFFIX: &str = "\r\n\r\n";
    let header_len_with_zero = (head_prefix.len() + 1 + SUFFIX.len()) as u64;
    let content_length = total.saturating_sub(header_len_with_zero);
    let header_len = (head_prefix.len() + content_length.to_string().len() + SUFFIX.len()) as u64;
    let corrected_content_length = total.saturating_sub(header_len);
    let digits_diff = content_length.to_string().len() as i64 - corrected_content_length.to_string().len() as i64;
    let spaces = " ".repeat(digits_diff.max(0) as usize);
    format!("{head_prefix}{corrected_content_length}{spaces}{SUFFIX}")
}

impl LayerOps for Http {
    fn post_plan_flow(&mut self, flow: &mut Flow, _rng: &mut Rng) {
        let mut i = 0;
        while i < flow.packets.len() {
            if flow.packets[i].is_finished || flow.packets[i].is_extra {
                i += 1;
                continue;
            }
            let dir = flow.packets[i].direction;
            let mut j = i;
            let mut run_size = 0u64;
            while j < flow.packets.len()
                && flow.packets[j].direction == dir
                && !flow.packets[j].is_finished
                && !flow.packets[j].is_extra
            {
                run_size += flow.packets[j].size;
                j += 1;
            }
            let (initial, cont) = match dir {
                Direction::Forward | Direction::Unknown => (HttpMessageKind::ReqInitial, HttpMessageKind::ReqContinuation),
                Direction::Reverse => (HttpMessageKind::ResInitial, HttpMessageKind::ResContinuation),
            };
            flow.packets[i].params.http_message = Some(initial);
            flow.packets[i].params.http_message_size = Some(run_size);
            for p in &mut flow.packets[i + 1..j] {
                p.params.http_message = Some(cont);
            }
            i = j;
        }
    }

    fn plan_flow(&mut self, _flow: &mut Flow, _rng: &mut Rng) {}

    fn build(&mut self, pkt: &mut BuildingPacket, planned: &mut PlannedPacket, rng: &mut Rng) {
        match planned.params.http_message {
            Some(HttpMessageKind::ReqInitial) => {
                let total = planned.params.http_message_size.unwrap_or(planned.size);
                let host = domainname::generate(rng, rng.uniform_range(8, 32) as usize);
                let use_post = rng.uniform_f64() < 0.3;
                let header = *rng.choose(HEADER_VOCAB);

                let line = if use_post {
                    let head = format!("POST / HTTP/1.1\r\nHost: {host}\r\n{header}: flowforge\r\nContent-Length: ");
                    append_content_length(&head, total)
                } else {
                    format!("GET / HTTP/1.1\r\nHost: {host}\r\n{header}: flowforge\r\n\r\n")
                };
                let mut bytes = line.into_bytes();
                let budget = planned.size as usize;
                if bytes.len() > budget {
                    bytes.truncate(budget);
                } else {
                    let fill = rng.random_bytes(budget - bytes.len());
                    bytes.extend_from_slice(&fill);
                }
                pkt.append(&bytes);
            }
            Some(HttpMessageKind::ResInitial) => {
                let total = planned.params.http_message_size.unwrap_or(planned.size);
                let head = "HTTP/1.1 200 OK\r\nServer: flowforge\r\nContent-Type: text/html\r\nContent-Length: ";
                let line = append_content_length(head, total);
                let mut bytes = line.into_bytes();
                let budget = planned.size as usize;
                if bytes.len() > budget {
                    bytes.truncate(budget);
                } else {
                    let fill = rng.random_bytes(budget - bytes.len());
                    bytes.extend_from_slice(&fill);
                }
                pkt.append(&bytes);
            }
            _ => {
                let data = rng.random_bytes(planned.size as usize);
                pkt.append(&data);
            }
        }
        planned.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_length_plus_declared_content_length_equals_total() {
        let head = "HTTP/1.1 200 OK\r\nServer: flowforge\r\nContent-Type: text/html\r\nContent-Length: ";
        for total in [100u64, 1000, 9999, 10000, 99999999] {
            let line = append_content_length(head, total);
            assert!(line.ends_with("\r\n\r\n"));
            let declared: u64 = line[head.len()..line.len() - 4].trim_end().parse().unwrap();
            assert_eq!(line.len() as u64 + declared, total, "mismatch for total={total}");
        }
    }
}
