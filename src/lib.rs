// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Core receive engine for a zero-copy Active-Message stream transport.
//!
//! Inbound fragments, fed through [`Worker::am_handler`], are matched
//! against receive requests posted via [`Worker::recv`] or lent directly to
//! the caller as a [`DataRef`] through [`Worker::recv_data`]. An endpoint's
//! lifecycle is driven by [`Worker::ep_init`], [`Worker::ep_activate`], and
//! [`Worker::ep_cleanup`]; [`Worker::poll_ready`] drives an external
//! progress loop across endpoints with data waiting.
//!
//! The worker serializes all of the above behind a single conditional
//! critical section, chosen at construction via [`WorkerConfig::threading`]
//! -- see [`ThreadingMode`].

mod datatype;
mod descriptor;
mod endpoint;
mod error;
mod flags;
mod fragment;
mod lifecycle;
mod pool;
mod ready;
mod request;
mod worker;

pub use datatype::{DtClass, GenericUnpack, RecvBuffer, MAX_IOV};
pub use endpoint::EndpointKey;
pub use error::{Error, Kind};
pub use fragment::FragmentOutcome;
pub use request::{Completion, CompletionCallback, DataRef, RecvParams, RecvStatus, RequestHandle};
pub use worker::{ThreadingMode, Worker, WorkerConfig};
