// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The receive request engine (C6, §4.4).
//!
//! Completion is delivered one of two ways, chosen by whether the caller
//! supplied a callback -- mirroring `s2n-quic-dc`'s dual sync/async
//! completion shape in `recv/application.rs`, simplified here to a single
//! synchronous API surface (no `Future`/waker plumbing) since the engine
//! itself has no suspension points (§5): a posted request without a
//! callback is polled through a [`RequestHandle`] backed by a
//! `Arc<Mutex<Option<Completion>>>`, the same shared-slot idea as the
//! teacher's `Arc<DescriptorInner<T>>` reference-counted completion state.

use crate::{
    datatype::{DtClass, RecvBuffer},
    descriptor::Descriptor,
    endpoint::{Endpoint, EndpointKey, EndpointTable},
    error::{self, Error, Kind},
    flags::RequestFlags,
    ready::ReadyQueue,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// A completion callback, invoked exactly once with the terminal result.
pub type CompletionCallback<C> = Box<dyn FnOnce(Completion<C>) + Send>;

/// The terminal result of a receive, whichever path produced it.
pub struct Completion<C> {
    pub buffer: RecvBuffer,
    pub length: usize,
    pub status: Result<(), Error>,
    pub cookie: C,
}

/// Parameters to [`crate::Worker::recv`], corresponding to §6's `recv_nbx`
/// `params(datatype, flags, callback)`.
pub struct RecvParams<C> {
    /// Element size for contig granularity checks (§4.4); ignored for
    /// iov/generic destinations. Treated as 1 if zero.
    pub elem_size: usize,
    /// Don't complete until the destination is entirely filled.
    pub waitall: bool,
    /// Fail fast rather than posting a pending request if no data is
    /// immediately available for the inplace fast path.
    pub force_imm_cmpl: bool,
    /// Never take the inplace fast path even if data is queued.
    pub no_imm_cmpl: bool,
    /// Expected total byte length for a `Generic` destination, whose
    /// capacity is otherwise unbounded. Ignored for contig/iov.
    pub expected_len: Option<usize>,
    pub cookie: C,
    pub callback: Option<CompletionCallback<C>>,
}

/// What `recv` returned (§6: "a handle yields OK/NULL for immediate
/// completion ... or a valid opaque pointer for pending").
pub enum RecvStatus<C> {
    /// Completed within the call; returned when no callback was supplied.
    Completed(Completion<C>),
    /// Posted; poll [`RequestHandle::try_take`] for the result.
    Posted(RequestHandle<C>),
    /// A callback was supplied and has been (or will be) invoked exactly
    /// once; no handle is returned.
    Dispatched,
}

struct Shared<C> {
    state: Mutex<Option<Completion<C>>>,
}

impl<C> Default for Shared<C> {
    // Not derived: `#[derive(Default)]` would require `C: Default`, but a
    // pending completion slot starts empty regardless of whether the
    // cookie type has one.
    fn default() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }
}

/// A handle to a posted request's eventual completion.
pub struct RequestHandle<C> {
    shared: Arc<Shared<C>>,
}

impl<C> RequestHandle<C> {
    /// Returns the completion if it has landed, without blocking.
    pub fn try_take(&self) -> Option<Completion<C>> {
        self.shared.state.lock().take()
    }
}

/// A posted receive request (§3 "Receive Request").
pub(crate) struct Request<C> {
    pub(crate) buffer: RecvBuffer,
    pub(crate) offset: usize,
    pub(crate) length: usize,
    pub(crate) elem_size: usize,
    pub(crate) flags: RequestFlags,
    cookie: Option<C>,
    callback: Option<CompletionCallback<C>>,
    shared: Option<Arc<Shared<C>>>,
}

impl<C> Request<C> {
    pub(crate) fn remaining(&self) -> usize {
        self.length.saturating_sub(self.offset)
    }
}

/// `can_complete(req)` (§4.4).
pub(crate) fn can_complete<C>(req: &Request<C>) -> bool {
    if req.offset == req.length {
        return true;
    }
    if req.flags.contains(RequestFlags::WAITALL) || req.offset == 0 {
        return false;
    }
    if req.buffer.dt_class() != DtClass::Contig {
        return true;
    }
    req.offset % req.elem_size.max(1) == 0
}

/// Unpacks as much of `src` as fits in `req`'s remaining capacity,
/// advancing `req.offset`. Used by the inbound match loop (C5).
pub(crate) fn fill_request<C>(req: &mut Request<C>, src: &[u8], last: bool) -> error::Result<usize> {
    let n = req.remaining().min(src.len());
    let consumed = req.buffer.unpack(req.offset, &src[..n], last)?;
    req.offset += consumed;
    Ok(consumed)
}

/// Granularity clamp shared by the inbound match loop (C5) and `recv_nbx`'s
/// own drain loop: a contig request without `WAITALL` only completes on an
/// `elem_size` boundary (§4.4, §8 item 5), so a chunk that would leave it
/// part way into an element is clamped down to the boundary before it's
/// unpacked, rather than absorbed and then rejected at completion time.
///
/// If the clamp would reduce `take` to zero -- the available chunk is
/// smaller than one element -- there is no aligned amount to fall back to,
/// so the raw, unaligned `take` is absorbed into the request as-is. The
/// request simply won't satisfy `can_complete` until a later chunk brings
/// it back onto a boundary; this avoids manufacturing a separate queued
/// descriptor for a few leftover bytes that a posted request already has
/// capacity for.
pub(crate) fn clamp_to_granularity<C>(req: &Request<C>, take: usize, would_finish: bool) -> usize {
    if would_finish || req.flags.contains(RequestFlags::WAITALL) || req.buffer.dt_class() != DtClass::Contig {
        return take;
    }
    let elem_size = req.elem_size.max(1);
    let aligned_new_offset = (req.offset + take) / elem_size * elem_size;
    let clamped = aligned_new_offset.saturating_sub(req.offset);
    if clamped == 0 {
        take
    } else {
        clamped
    }
}

/// Delivers a request's terminal result to its callback or its shared
/// completion slot. Used for completions that happen off the call stack
/// that posted the request: inbound fragment matching (C5) and endpoint
/// cleanup (C7).
pub(crate) fn dispatch_completion<C>(req: Request<C>, status: error::Result<()>) {
    let length = req.offset;
    let Request {
        buffer,
        mut cookie,
        mut callback,
        mut shared,
        ..
    } = req;
    let completion = Completion {
        buffer,
        length,
        status,
        cookie: cookie.take().expect("cookie set exactly once at request creation"),
    };
    if let Some(cb) = callback.take() {
        cb(completion);
    } else if let Some(shared) = shared.take() {
        *shared.state.lock() = Some(completion);
    }
}

fn finish_inline<C>(
    buffer: RecvBuffer,
    length: usize,
    status: error::Result<()>,
    cookie: C,
    callback: Option<CompletionCallback<C>>,
) -> RecvStatus<C> {
    let completion = Completion {
        buffer,
        length,
        status,
        cookie,
    };
    match callback {
        Some(cb) => {
            cb(completion);
            RecvStatus::Dispatched
        }
        None => RecvStatus::Completed(completion),
    }
}

/// Advances the endpoint's front descriptor by `k` bytes (§4.4 "Advancing a
/// descriptor"). Dequeues and releases it if fully consumed. If the queue
/// empties, clears `HAS_DATA` and removes the endpoint from the ready list
/// in the same step (§4.1).
pub(crate) fn advance_front_descriptor<C>(
    ep: &mut Endpoint<C>,
    ready: &mut ReadyQueue,
    key: EndpointKey,
    k: u32,
) {
    let fully_consumed = {
        let desc = ep.peek_data_mut().expect("caller holds a peeked descriptor");
        desc.advance(k);
        desc.is_empty()
    };
    if fully_consumed {
        ep.pop_data();
    }
    if !ep.has_data() {
        ready.remove(key, &mut ep.flags);
    }
}

/// `try_recv_inplace` (§4.4). Returns `None` for the internal `NO_PROGRESS`
/// signal (§7: never surfaced to callers), `Some(len)` on success.
pub(crate) fn try_recv_inplace<C>(
    ep: &mut Endpoint<C>,
    ready: &mut ReadyQueue,
    key: EndpointKey,
    buffer: &mut RecvBuffer,
    elem_size: usize,
    waitall: bool,
    no_imm_cmpl: bool,
) -> Option<usize> {
    if no_imm_cmpl || !ep.has_data() {
        return None;
    }

    let dt = buffer.dt_class();
    if dt != DtClass::Contig && dt != DtClass::Iov {
        return None;
    }

    let recv_length = buffer.total_len();
    let elem_size = elem_size.max(1);
    let desc_len = ep
        .peek_data_mut()
        .expect("has_data implies a front descriptor")
        .len() as usize;

    let take = if desc_len >= recv_length {
        recv_length
    } else if waitall || desc_len < elem_size {
        return None;
    } else {
        (desc_len / elem_size) * elem_size
    };

    if take == 0 {
        return None;
    }

    let consumed = {
        let desc = ep.peek_data_mut().expect("checked above");
        let slice = &desc.as_slice()[..take];
        buffer
            .unpack(0, slice, true)
            .expect("contig/iov unpack is infallible")
    };
    debug_assert_eq!(consumed, take);

    advance_front_descriptor(ep, ready, key, take as u32);
    tracing::trace!(?key, take, "inplace receive");
    Some(take)
}

/// `recv_nbx` (§4.4, §6).
pub(crate) fn recv_nbx<C: Send + 'static>(
    table: &mut EndpointTable<C>,
    ready: &mut ReadyQueue,
    key: EndpointKey,
    mut buffer: RecvBuffer,
    mut params: RecvParams<C>,
) -> error::Result<RecvStatus<C>> {
    let ep = table.get_mut(key).ok_or_else(|| Kind::InvalidParam.err())?;

    if let Some(len) = try_recv_inplace(
        ep,
        ready,
        key,
        &mut buffer,
        params.elem_size,
        params.waitall,
        params.no_imm_cmpl,
    ) {
        return Ok(finish_inline(buffer, len, Ok(()), params.cookie, params.callback.take()));
    }

    if params.force_imm_cmpl {
        return Err(Kind::NoResource.err());
    }

    let total_len = params.expected_len.unwrap_or_else(|| buffer.total_len());
    let elem_size = params.elem_size.max(1);

    let mut req_flags = RequestFlags::EXPECTED;
    if params.waitall {
        req_flags.insert(RequestFlags::WAITALL);
    }
    if params.callback.is_some() {
        req_flags.insert(RequestFlags::CALLBACK);
    }

    let mut req = Request {
        buffer,
        offset: 0,
        length: total_len,
        elem_size,
        flags: req_flags,
        cookie: Some(params.cookie),
        callback: params.callback,
        shared: None,
    };

    // Drain loop (§4.4 step 4): pull already-queued descriptors into the
    // fresh request before deciding whether it completes inline.
    while req.offset < req.length && ep.has_data() {
        let consumed = {
            let desc = ep.peek_data_mut().expect("has_data implies a front descriptor");
            let remaining = req.remaining();
            let desc_len = desc.len() as usize;
            let would_finish = desc_len >= remaining;
            let take = clamp_to_granularity(&req, remaining.min(desc_len), would_finish);
            let last = take == remaining;
            let slice = &desc.as_slice()[..take];
            req.buffer.unpack(req.offset, slice, last)?
        };
        req.offset += consumed;
        advance_front_descriptor(ep, ready, key, consumed as u32);

        if req.buffer.dt_class() == DtClass::Generic && !req.flags.contains(RequestFlags::WAITALL) {
            // avoids extra buffering beyond the first available chunk.
            break;
        }
    }

    if can_complete(&req) {
        let length = req.offset;
        let Request {
            buffer,
            mut cookie,
            mut callback,
            ..
        } = req;
        return Ok(finish_inline(
            buffer,
            length,
            Ok(()),
            cookie.take().expect("cookie set exactly once at request creation"),
            callback.take(),
        ));
    }

    let status = if req.callback.is_none() {
        let shared = Arc::new(Shared::default());
        req.shared = Some(shared.clone());
        RecvStatus::Posted(RequestHandle { shared })
    } else {
        RecvStatus::Dispatched
    };

    ep.push_request(req);
    Ok(status)
}

/// A zero-copy lend of one descriptor's payload to the caller (§4.4
/// `recv_data_nb`). Dropping (or explicitly [`DataRef::release`]-ing) the
/// handle returns the descriptor to its origin -- in Rust the move-only
/// [`Descriptor`]'s own `Drop` already does the recovery the spec's
/// `((header*)ptr - 1)->rdesc` back-pointer trick exists to perform in a
/// language without an owning smart pointer, so no separate header word is
/// needed here.
pub struct DataRef {
    desc: Descriptor,
}

impl DataRef {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.desc.as_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.desc.len() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.desc.is_empty()
    }

    /// Releases the descriptor back to its origin. Equivalent to dropping
    /// the handle; provided so call sites can name the operation the way
    /// §4.4 does.
    #[inline]
    pub fn release(self) {}
}

/// `recv_data_nb` (§4.4).
pub(crate) fn recv_data_nb<C>(
    table: &mut EndpointTable<C>,
    ready: &mut ReadyQueue,
    key: EndpointKey,
) -> error::Result<Option<DataRef>> {
    let ep = table.get_mut(key).ok_or_else(|| Kind::InvalidParam.err())?;
    if !ep.has_data() {
        return Ok(None);
    }
    let desc = ep.pop_data().expect("has_data implies a front descriptor");
    if !ep.has_data() {
        ready.remove(key, &mut ep.flags);
    }
    tracing::trace!(?key, len = desc.len(), "zero-copy lend");
    Ok(Some(DataRef { desc }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::RecvBuffer;

    fn new_table_with_endpoint() -> (EndpointTable<u32>, ReadyQueue, EndpointKey) {
        let mut table = EndpointTable::new();
        let key = table.insert(1);
        (table, ReadyQueue::new(), key)
    }

    #[test]
    fn inplace_consumes_exact_match() {
        let (mut table, mut ready, key) = new_table_with_endpoint();
        let ep = table.get_mut(key).unwrap();
        ep.push_data(Descriptor::from_transport(b"ABCD".to_vec(), 0));

        let mut buf = RecvBuffer::Contig(vec![0u8; 4]);
        let n = try_recv_inplace(ep, &mut ready, key, &mut buf, 1, false, false).unwrap();
        assert_eq!(n, 4);
        assert!(!ep.has_data());
        match buf {
            RecvBuffer::Contig(v) => assert_eq!(&v[..], b"ABCD"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn inplace_aligns_down_to_elem_size() {
        let (mut table, mut ready, key) = new_table_with_endpoint();
        let ep = table.get_mut(key).unwrap();
        ep.push_data(Descriptor::from_transport(vec![0u8; 10], 0));

        // requesting 3 elements of size 4 (12 bytes) but only 10 queued
        let mut buf = RecvBuffer::Contig(vec![0u8; 12]);
        let n = try_recv_inplace(ep, &mut ready, key, &mut buf, 4, false, false).unwrap();
        assert_eq!(n, 8);
        assert!(ep.has_data());
    }

    #[test]
    fn recv_nbx_posts_when_no_data_available() {
        let (mut table, mut ready, key) = new_table_with_endpoint();
        let buf = RecvBuffer::Contig(vec![0u8; 4]);
        let params = RecvParams {
            elem_size: 1,
            waitall: false,
            force_imm_cmpl: false,
            no_imm_cmpl: false,
            expected_len: None,
            cookie: 7u32,
            callback: None,
        };
        let status = recv_nbx(&mut table, &mut ready, key, buf, params).unwrap();
        assert!(matches!(status, RecvStatus::Posted(_)));
    }

    #[test]
    fn recv_nbx_force_imm_cmpl_without_data_fails() {
        let (mut table, mut ready, key) = new_table_with_endpoint();
        let buf = RecvBuffer::Contig(vec![0u8; 4]);
        let params = RecvParams {
            elem_size: 1,
            waitall: false,
            force_imm_cmpl: true,
            no_imm_cmpl: false,
            expected_len: None,
            cookie: 0u32,
            callback: None,
        };
        let err = recv_nbx(&mut table, &mut ready, key, buf, params).unwrap_err();
        assert_eq!(err.kind(), Kind::NoResource);
    }
}
