// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The global ready-endpoint scheduler (C3, §3 "Ready Endpoint List", §4.1).
//!
//! A plain FIFO over endpoint keys. Idempotency of membership is tracked on
//! the endpoint itself via `EndpointFlags::IS_QUEUED` (§4.1), the same split
//! of "is this handle already registered" (a flag on the owner) from "what
//! order do registered handles get serviced in" (a plain queue) used by
//! `dispatch/queue.rs`'s ready-list bookkeeping.

use crate::{endpoint::EndpointKey, flags::EndpointFlags};
use std::collections::VecDeque;

#[derive(Default)]
pub(crate) struct ReadyQueue {
    queue: VecDeque<EndpointKey>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Idempotently registers `key` (§4.1: "enqueue_ready(ep) ... toggle the
    /// flag atomically with the list operation"). No-op if already queued.
    pub(crate) fn enqueue(&mut self, key: EndpointKey, flags: &mut EndpointFlags) {
        if flags.contains(EndpointFlags::IS_QUEUED) {
            return;
        }
        flags.insert(EndpointFlags::IS_QUEUED);
        self.queue.push_back(key);
        tracing::trace!(?key, "ready: enqueue");
    }

    /// Removes `key` if present. No-op if not queued. Used when the last
    /// descriptor is consumed and `HAS_DATA` is cleared (§4.1).
    pub(crate) fn remove(&mut self, key: EndpointKey, flags: &mut EndpointFlags) {
        if !flags.contains(EndpointFlags::IS_QUEUED) {
            return;
        }
        flags.remove(EndpointFlags::IS_QUEUED);
        if let Some(pos) = self.queue.iter().position(|&k| k == key) {
            self.queue.remove(pos);
            tracing::trace!(?key, "ready: remove");
        }
    }

    /// Pops the next endpoint for a progress loop to service. The caller is
    /// responsible for clearing `IS_QUEUED` on the returned endpoint (this
    /// type has no access to the endpoint table to do so itself).
    pub(crate) fn pop_front(&mut self) -> Option<EndpointKey> {
        self.queue.pop_front()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
