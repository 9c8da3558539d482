// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Endpoint lifecycle hooks (C7, §4.5).

use crate::{
    endpoint::{EndpointKey, EndpointTable},
    error::Error,
    flags::EndpointFlags,
    ready::ReadyQueue,
    request,
};

/// `ep_init`: allocates and zeroes a new endpoint's receive state.
pub(crate) fn ep_init<C>(table: &mut EndpointTable<C>, id: u64) -> EndpointKey {
    let key = table.insert(id);
    tracing::debug!(id, ?key, "ep_init");
    key
}

/// `ep_activate`: called once the endpoint transitions to "usable". If data
/// already arrived before activation (Design Notes' lost-wakeup caveat: new
/// endpoints can accumulate data on `match_q` before they are activated),
/// this is what finally puts it on the ready list.
pub(crate) fn ep_activate<C>(table: &mut EndpointTable<C>, ready: &mut ReadyQueue, key: EndpointKey) {
    let ep = table.get_mut(key).expect("valid endpoint key");
    ep.flags.insert(EndpointFlags::IS_ACTIVE);
    if ep.has_data() {
        ready.enqueue(key, &mut ep.flags);
    }
    tracing::debug!(?key, "ep_activate");
}

/// `ep_cleanup(ep, status)`: drains and releases unmatched descriptors,
/// removes the endpoint from the ready list, then completes every posted
/// request with `status`. Post-condition: `match_q` empty, `HAS_DATA` and
/// `IS_QUEUED` both clear.
pub(crate) fn ep_cleanup<C>(
    table: &mut EndpointTable<C>,
    ready: &mut ReadyQueue,
    key: EndpointKey,
    status: Error,
) {
    let ep = table.get_mut(key).expect("valid endpoint key");

    let descriptors = ep.drain_data();
    tracing::debug!(?key, released = descriptors.len(), "ep_cleanup: releasing descriptors");
    drop(descriptors);
    ready.remove(key, &mut ep.flags);

    let pending = ep.drain_requests();
    tracing::debug!(?key, canceled = pending.len(), "ep_cleanup: canceling pending requests");
    for req in pending {
        request::dispatch_completion(req, Err(status));
    }

    debug_assert!(!table.get(key).unwrap().has_data());
    debug_assert!(!table.get(key).unwrap().is_queued());
}
