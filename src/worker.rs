// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The worker: the top-level handle embedders hold, tying together the
//! endpoint table, ready scheduler, and descriptor pool behind a single
//! conditional critical section (§5, Design Notes "Ambient mutability").

use crate::{
    datatype::RecvBuffer,
    endpoint::{EndpointKey, EndpointTable},
    error::{self, Error, Kind},
    flags::EndpointFlags,
    fragment::{self, FragmentOutcome},
    lifecycle,
    pool::BufferPool,
    ready::ReadyQueue,
    request::{self, DataRef, RecvParams, RecvStatus},
};
use parking_lot::{Mutex, MutexGuard};

/// Selects the worker's critical-section policy (§5, Design Notes). Chosen
/// once at construction, not switchable afterward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadingMode {
    /// A single thread drives both the AM callback and all user calls; the
    /// critical section is a no-op.
    SingleThreaded,
    /// User calls and the AM callback may arrive from different threads; a
    /// mutex serializes entry.
    MultiThreaded,
}

enum Cs {
    Noop,
    Mutex(Mutex<()>),
}

impl Cs {
    fn new(mode: ThreadingMode) -> Self {
        match mode {
            ThreadingMode::SingleThreaded => Self::Noop,
            ThreadingMode::MultiThreaded => Self::Mutex(Mutex::new(())),
        }
    }

    #[inline]
    fn enter(&self) -> Option<MutexGuard<'_, ()>> {
        match self {
            Self::Noop => None,
            Self::Mutex(m) => Some(m.lock()),
        }
    }
}

/// Construction-time configuration for a [`Worker`] (§10.3).
#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    pub threading: ThreadingMode,
    /// Backs the §6 feature gate: calls on a worker with this unset return
    /// `INVALID_PARAM`.
    pub stream_feature_enabled: bool,
    /// Capacity of each buffer pre-seeded into the descriptor pool.
    pub pool_page_size: usize,
    /// How many pages to pre-seed at construction.
    pub pool_initial_pages: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threading: ThreadingMode::SingleThreaded,
            stream_feature_enabled: true,
            pool_page_size: 4096,
            pool_initial_pages: 0,
        }
    }
}

/// The engine's top-level handle: one per transport worker.
pub struct Worker<C> {
    cs: Cs,
    config: WorkerConfig,
    table: EndpointTable<C>,
    ready: ReadyQueue,
    pool: BufferPool,
}

impl<C: Send + 'static> Worker<C> {
    pub fn new(config: WorkerConfig) -> Self {
        let pool = BufferPool::with_initial_pages(config.pool_page_size, config.pool_initial_pages);
        Self {
            cs: Cs::new(config.threading),
            config,
            table: EndpointTable::new(),
            ready: ReadyQueue::new(),
            pool,
        }
    }

    fn check_feature(&self) -> error::Result<()> {
        if self.config.stream_feature_enabled {
            Ok(())
        } else {
            tracing::debug!("stream feature not enabled on this worker");
            Err(Kind::InvalidParam.err())
        }
    }

    /// `ep_init` (§4.5).
    pub fn ep_init(&mut self, id: u64) -> EndpointKey {
        let _cs = self.cs.enter();
        lifecycle::ep_init(&mut self.table, id)
    }

    /// `ep_activate` (§4.5).
    pub fn ep_activate(&mut self, key: EndpointKey) {
        let _cs = self.cs.enter();
        lifecycle::ep_activate(&mut self.table, &mut self.ready, key);
    }

    /// `ep_cleanup` (§4.5).
    pub fn ep_cleanup(&mut self, key: EndpointKey, status: Error) {
        let _cs = self.cs.enter();
        lifecycle::ep_cleanup(&mut self.table, &mut self.ready, key, status);
    }

    /// `am_handler` (§4.3).
    pub fn am_handler(
        &mut self,
        endpoint_id: u64,
        buf: Vec<u8>,
        header_len: usize,
        desc_ownable: bool,
    ) -> FragmentOutcome {
        let _cs = self.cs.enter();
        fragment::am_handler(
            &mut self.table,
            &mut self.ready,
            &self.pool,
            endpoint_id,
            buf,
            header_len,
            desc_ownable,
        )
    }

    /// `recv_nbx` (§4.4, §6).
    pub fn recv(
        &mut self,
        endpoint_id: u64,
        buffer: RecvBuffer,
        params: RecvParams<C>,
    ) -> Result<RecvStatus<C>, Error> {
        self.check_feature()?;
        let _cs = self.cs.enter();
        let key = self
            .table
            .lookup(endpoint_id)
            .ok_or_else(|| Kind::InvalidParam.err())?;
        request::recv_nbx(&mut self.table, &mut self.ready, key, buffer, params)
    }

    /// `recv_data_nb` (§4.4).
    pub fn recv_data(&mut self, endpoint_id: u64) -> Result<Option<DataRef>, Error> {
        self.check_feature()?;
        let _cs = self.cs.enter();
        let key = self
            .table
            .lookup(endpoint_id)
            .ok_or_else(|| Kind::InvalidParam.err())?;
        request::recv_data_nb(&mut self.table, &mut self.ready, key)
    }

    /// Pops the next endpoint with data ready for a waiting user (§2, §4.1).
    /// External progress loops drive recv calls from this.
    pub fn poll_ready(&mut self) -> Option<EndpointKey> {
        let _cs = self.cs.enter();
        let key = self.ready.pop_front()?;
        if let Some(ep) = self.table.get_mut(key) {
            ep.flags.remove(EndpointFlags::IS_QUEUED);
        }
        Some(key)
    }
}
