// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types surfaced by the receive engine.
//!
//! Follows the same shape as `s2n-quic-dc`'s `stream::recv::error` module: a
//! small `Copy` wrapper records the call site of the error via
//! [`core::panic::Location`] while the actual variants live in [`Kind`].

use core::{fmt, panic::Location};

/// An error produced by the receive engine.
#[derive(Clone, Copy)]
pub struct Error {
    kind: Kind,
    location: &'static Location<'static>,
}

impl Error {
    #[track_caller]
    #[inline]
    pub(crate) fn new(kind: Kind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("file", &self.location.file())
            .field("line", &self.location.line())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}]: {}",
            self.location.file(),
            self.location.line(),
            self.kind
        )
    }
}

impl std::error::Error for Error {}

impl From<Kind> for Error {
    #[track_caller]
    #[inline]
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

/// The specific reason a receive-engine operation failed.
///
/// [`Kind::NoProgress`] is never returned from a public API; it is an
/// internal control-flow signal between the inplace fast path and
/// `recv_nbx` (see §7 of the specification) and is filtered out before a
/// result reaches the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Kind {
    /// The endpoint's worker does not have the stream feature enabled, or a
    /// parameter combination was malformed.
    #[error("invalid parameter")]
    InvalidParam,
    /// A request could not be allocated.
    #[error("no memory available to allocate a request")]
    NoMemory,
    /// `FORCE_IMM_CMPL` was requested but no data was available.
    #[error("immediate completion was forced but no data is available")]
    NoResource,
    /// Internal signal meaning the fast path made no progress; never surfaced.
    #[error("no progress was made")]
    NoProgress,
    /// The generic datatype's unpack callback rejected a chunk of data.
    #[error("datatype unpack failed")]
    Unpack,
    /// The endpoint was torn down with pending or queued state.
    #[error("the endpoint was cleaned up")]
    Canceled,
}

impl Kind {
    #[inline]
    #[track_caller]
    pub(crate) fn err(self) -> Error {
        Error::new(self)
    }
}

pub(crate) type Result<T> = core::result::Result<T, Error>;
