// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-endpoint receive state (C2, §3 "Endpoint Receive State", §4.1).
//!
//! Endpoints are stored in a [`slotmap::SlotMap`] the way `send/state.rs`
//! keys its stream state, rather than behind a pinned intrusive list node:
//! the engine only ever needs id-based lookup plus O(1) removal, which a
//! slot map gives for free without `unsafe` linked-list surgery.

use crate::{descriptor::Descriptor, flags::EndpointFlags, request::Request};
use std::collections::{HashMap, VecDeque};

slotmap::new_key_type! {
    /// A stable handle to one endpoint's receive state.
    pub struct EndpointKey;
}

/// The dual-polarity match queue (§3): either unmatched descriptors, or
/// posted requests, never both. The two branches only ever exchange at the
/// point where the queue is empty (Design Notes, "Intrusive queues with
/// dual polarity"), which `Worker` enforces by construction: the data
/// branch is never repopulated while requests are posted, and vice versa.
pub(crate) enum MatchQueue<C> {
    Data(VecDeque<Descriptor>),
    Requests(VecDeque<Request<C>>),
}

impl<C> MatchQueue<C> {
    fn has_data(&self) -> bool {
        matches!(self, Self::Data(q) if !q.is_empty())
    }

    fn has_requests(&self) -> bool {
        matches!(self, Self::Requests(q) if !q.is_empty())
    }
}

/// One endpoint's receive-side state.
pub(crate) struct Endpoint<C> {
    pub(crate) match_q: MatchQueue<C>,
    pub(crate) flags: EndpointFlags,
}

impl<C> Endpoint<C> {
    /// §4.5 `ep_init`: zero the match queue, nil the ready-list link (here,
    /// the absence of `IS_QUEUED` in a fresh flag set).
    pub(crate) fn new() -> Self {
        Self {
            match_q: MatchQueue::Data(VecDeque::new()),
            flags: EndpointFlags::empty(),
        }
    }

    /// §4.1 `has_data(ep)`.
    pub(crate) fn has_data(&self) -> bool {
        self.match_q.has_data()
    }

    pub(crate) fn has_requests(&self) -> bool {
        self.match_q.has_requests()
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.flags.contains(EndpointFlags::IS_QUEUED)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.flags.contains(EndpointFlags::IS_ACTIVE)
    }

    /// Pushes a descriptor onto the data branch of `match_q`. Only valid
    /// while the queue is empty or already in the data branch; callers
    /// must ensure no requests are posted first (§3's mutual-exclusion
    /// invariant), since fragments are only ever pushed here once the
    /// match loop (C5) has drained the request branch.
    pub(crate) fn push_data(&mut self, desc: Descriptor) {
        match &mut self.match_q {
            MatchQueue::Data(q) => q.push_back(desc),
            MatchQueue::Requests(q) if q.is_empty() => {
                self.match_q = MatchQueue::Data(VecDeque::from([desc]));
            }
            MatchQueue::Requests(_) => {
                unreachable!("push_data called while requests are posted")
            }
        }
    }

    pub(crate) fn peek_data_mut(&mut self) -> Option<&mut Descriptor> {
        match &mut self.match_q {
            MatchQueue::Data(q) => q.front_mut(),
            MatchQueue::Requests(_) => None,
        }
    }

    pub(crate) fn pop_data(&mut self) -> Option<Descriptor> {
        match &mut self.match_q {
            MatchQueue::Data(q) => q.pop_front(),
            MatchQueue::Requests(_) => None,
        }
    }

    pub(crate) fn push_request(&mut self, req: Request<C>) {
        match &mut self.match_q {
            MatchQueue::Requests(q) => q.push_back(req),
            MatchQueue::Data(q) if q.is_empty() => {
                self.match_q = MatchQueue::Requests(VecDeque::from([req]));
            }
            MatchQueue::Data(_) => {
                unreachable!("push_request called while data is queued")
            }
        }
    }

    pub(crate) fn pop_request(&mut self) -> Option<Request<C>> {
        match &mut self.match_q {
            MatchQueue::Requests(q) => q.pop_front(),
            MatchQueue::Data(_) => None,
        }
    }

    pub(crate) fn front_request_mut(&mut self) -> Option<&mut Request<C>> {
        match &mut self.match_q {
            MatchQueue::Requests(q) => q.front_mut(),
            MatchQueue::Data(_) => None,
        }
    }

    /// Drains every unmatched descriptor, e.g. for `ep_cleanup`.
    pub(crate) fn drain_data(&mut self) -> Vec<Descriptor> {
        match &mut self.match_q {
            MatchQueue::Data(q) => q.drain(..).collect(),
            MatchQueue::Requests(_) => Vec::new(),
        }
    }

    /// Drains every posted request, e.g. for `ep_cleanup`.
    pub(crate) fn drain_requests(&mut self) -> Vec<Request<C>> {
        match &mut self.match_q {
            MatchQueue::Requests(q) => q.drain(..).collect(),
            MatchQueue::Data(_) => Vec::new(),
        }
    }
}

/// The collection of all endpoints a worker knows about.
#[derive(Default)]
pub(crate) struct EndpointTable<C> {
    slots: slotmap::SlotMap<EndpointKey, Endpoint<C>>,
    by_id: HashMap<u64, EndpointKey>,
}

impl<C> EndpointTable<C> {
    pub(crate) fn new() -> Self {
        Self {
            slots: slotmap::SlotMap::with_key(),
            by_id: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: u64) -> EndpointKey {
        let key = self.slots.insert(Endpoint::new());
        self.by_id.insert(id, key);
        key
    }

    pub(crate) fn lookup(&self, id: u64) -> Option<EndpointKey> {
        self.by_id.get(&id).copied()
    }

    pub(crate) fn get(&self, key: EndpointKey) -> Option<&Endpoint<C>> {
        self.slots.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: EndpointKey) -> Option<&mut Endpoint<C>> {
        self.slots.get_mut(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_and_requests_are_mutually_exclusive() {
        let mut ep: Endpoint<()> = Endpoint::new();
        assert!(!ep.has_data());
        assert!(!ep.has_requests());

        ep.push_data(Descriptor::from_transport(b"xyz".to_vec(), 0));
        assert!(ep.has_data());
        ep.pop_data().unwrap();
        assert!(!ep.has_data());
    }

    #[test]
    fn lookup_round_trips_through_table() {
        let mut table: EndpointTable<()> = EndpointTable::new();
        let key = table.insert(42);
        assert_eq!(table.lookup(42), Some(key));
        assert!(table.get(key).is_some());
    }
}
