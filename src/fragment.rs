// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The inbound Active Message fragment handler (C5, §4.3).

use crate::{
    descriptor::Descriptor,
    endpoint::{EndpointKey, EndpointTable},
    pool::BufferPool,
    ready::ReadyQueue,
    request,
};

/// Whether `am_handler` consumed the transport's buffer inline or retained
/// it as a descriptor (§4.3: "Output: OK ... or INPROGRESS").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Buffer consumed inline; transport may free or reuse it.
    Ok,
    /// The handler retained the buffer as a descriptor.
    InProgress,
}

/// `am_handler` (§4.3). `buf` is the full wire buffer including the
/// `header_len`-byte AM header; `desc_ownable` mirrors the transport flag
/// indicating the buffer may be taken over in place rather than copied.
pub(crate) fn am_handler<C>(
    table: &mut EndpointTable<C>,
    ready: &mut ReadyQueue,
    pool: &BufferPool,
    endpoint_id: u64,
    buf: Vec<u8>,
    header_len: usize,
    desc_ownable: bool,
) -> FragmentOutcome {
    let Some(key) = table.lookup(endpoint_id) else {
        tracing::trace!(endpoint_id, "am_handler: unknown endpoint, dropping fragment");
        return FragmentOutcome::Ok;
    };

    let total_payload_len = buf.len() - header_len;
    let consumed = match_against_posted_requests(table, key, &buf, header_len, total_payload_len);

    if consumed >= total_payload_len {
        tracing::trace!(endpoint_id, consumed, "am_handler: fragment fully matched inline");
        return FragmentOutcome::Ok;
    }

    let desc = if desc_ownable {
        Descriptor::from_transport(buf, header_len + consumed)
    } else {
        Descriptor::copied(pool, &buf[header_len + consumed..])
    };
    let remaining = desc.len();

    let ep = table.get_mut(key).expect("looked up above");
    ep.push_data(desc);
    if ep.is_active() {
        ready.enqueue(key, &mut ep.flags);
    }

    tracing::trace!(endpoint_id, remaining, "am_handler: residue queued as descriptor");
    FragmentOutcome::InProgress
}

/// Step 2 of §4.3's algorithm: while the endpoint has no queued data and at
/// least one posted request, feed the fragment's payload to posted requests
/// FIFO. Returns the number of payload bytes consumed this way.
fn match_against_posted_requests<C>(
    table: &mut EndpointTable<C>,
    key: EndpointKey,
    buf: &[u8],
    header_len: usize,
    total_payload_len: usize,
) -> usize {
    let ep = table.get_mut(key).expect("caller looked up the endpoint");
    if ep.has_data() || !ep.has_requests() {
        return 0;
    }

    let mut consumed = 0usize;
    loop {
        if consumed >= total_payload_len {
            break;
        }
        let Some(req) = ep.front_request_mut() else {
            break;
        };
        let cursor = &buf[header_len + consumed..];
        let remaining = req.remaining();
        let would_finish = remaining.min(cursor.len()) == remaining;
        // Granularity (§4.4, §8 item 5): a contig request without WAITALL
        // may only complete early on an elem_size boundary, so consumption
        // is clamped to the boundary here rather than left to straddle one.
        // If there isn't even a full element available, the clamp falls
        // back to absorbing the raw bytes (see `clamp_to_granularity`)
        // instead of leaving them to be queued as a separate descriptor.
        let take = request::clamp_to_granularity(req, remaining.min(cursor.len()), would_finish);
        let last = take == remaining;
        match request::fill_request(req, &cursor[..take], last) {
            Ok(n) => {
                consumed += n;
                if request::can_complete(req) {
                    let req = ep.pop_request().expect("front request just completed");
                    request::dispatch_completion(req, Ok(()));
                } else {
                    // request absorbed everything this clamp allowed;
                    // leave it posted for the next fragment.
                    break;
                }
            }
            Err(e) => {
                let req = ep.pop_request().expect("front request just failed to unpack");
                request::dispatch_completion(req, Err(e));
                break;
            }
        }
    }
    consumed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{datatype::RecvBuffer, request::RecvParams};

    fn make_fragment(header_len: usize, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0xAAu8; header_len];
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn fragment_with_no_posted_requests_is_queued() {
        let mut table = EndpointTable::new();
        let mut ready = ReadyQueue::new();
        let pool = BufferPool::new();
        let key = table.insert(1);
        table.get_mut(key).unwrap().flags.insert(crate::flags::EndpointFlags::IS_ACTIVE);

        let buf = make_fragment(2, b"hello");
        let outcome = am_handler(&mut table, &mut ready, &pool, 1, buf, 2, false);
        assert_eq!(outcome, FragmentOutcome::InProgress);
        assert!(table.get(key).unwrap().has_data());
        assert_eq!(ready.pop_front(), Some(key));
    }

    #[test]
    fn fragment_satisfies_posted_request_inline() {
        let mut table = EndpointTable::new();
        let mut ready = ReadyQueue::new();
        let pool = BufferPool::new();
        let key = table.insert(1);

        let params = RecvParams {
            elem_size: 1,
            waitall: false,
            force_imm_cmpl: false,
            no_imm_cmpl: false,
            expected_len: None,
            cookie: 99u32,
            callback: None,
        };
        let status =
            request::recv_nbx(&mut table, &mut ready, key, RecvBuffer::Contig(vec![0u8; 5]), params).unwrap();
        assert!(matches!(status, crate::request::RecvStatus::Posted(_)));

        let buf = make_fragment(1, b"world");
        let outcome = am_handler(&mut table, &mut ready, &pool, 1, buf, 1, false);
        assert_eq!(outcome, FragmentOutcome::Ok);
        assert!(!table.get(key).unwrap().has_data());
        assert!(!table.get(key).unwrap().has_requests());
    }

    #[test]
    fn unknown_endpoint_drops_fragment() {
        let mut table: EndpointTable<()> = EndpointTable::new();
        let mut ready = ReadyQueue::new();
        let pool = BufferPool::new();
        let buf = make_fragment(1, b"abc");
        let outcome = am_handler(&mut table, &mut ready, &pool, 404, buf, 1, false);
        assert_eq!(outcome, FragmentOutcome::Ok);
    }
}
