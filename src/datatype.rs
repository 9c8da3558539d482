// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The data-type unpack cursor (C4, §4.2).
//!
//! Rather than a raw pointer and a `dt_class` tag the caller has to
//! interpret (the natural shape in a C transport library), the three
//! classes are represented as a closed enum that owns its destination
//! storage outright. This follows the Design Notes' guidance directly:
//! "expose the payload as a slice"; here the user's destination buffer
//! *is* the owned value moved into the request and handed back at
//! completion, rather than a pointer threaded through `unsafe` code the
//! way `dispatch/descriptor.rs`'s self-referential embedding works for
//! rdesc.

use crate::error::{self, Error};
use arrayvec::ArrayVec;

/// Maximum number of scatter/gather entries a single IOV receive may use.
pub const MAX_IOV: usize = 16;

/// Which unpack discipline a [`RecvBuffer`] follows (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DtClass {
    /// Straight `memcpy`, with element-size granularity enforced by the
    /// caller (C6), not the iterator.
    Contig,
    /// Scatter/gather list, 1-byte granularity.
    Iov,
    /// Opaque user pack/unpack callback; any quantity is a valid chunk.
    Generic,
}

/// A user-provided pack/unpack vtable for the `Generic` datatype class.
pub trait GenericUnpack: core::fmt::Debug + Send {
    /// Unpacks `src` at logical offset `offset` into the destination this
    /// object represents. `last` mirrors the iterator's `last` flag (§4.2):
    /// true on the final call for a given request, so implementations may
    /// release any scratch state they held across calls.
    fn unpack(&mut self, offset: usize, src: &[u8], last: bool) -> Result<(), Error>;
}

/// The destination of a receive, and the unpack discipline used to fill it.
pub enum RecvBuffer {
    Contig(Vec<u8>),
    Iov(ArrayVec<Box<[u8]>, MAX_IOV>),
    Generic(Box<dyn GenericUnpack>),
}

impl RecvBuffer {
    #[inline]
    pub fn dt_class(&self) -> DtClass {
        match self {
            Self::Contig(_) => DtClass::Contig,
            Self::Iov(_) => DtClass::Iov,
            Self::Generic(_) => DtClass::Generic,
        }
    }

    /// The total capacity of the destination, used to compute `recv_length`
    /// in the inplace fast path (§4.4). Generic destinations accept any
    /// quantity, so they report an unbounded capacity.
    #[inline]
    pub(crate) fn total_len(&self) -> usize {
        match self {
            Self::Contig(buf) => buf.len(),
            Self::Iov(slices) => slices.iter().map(|s| s.len()).sum(),
            Self::Generic(_) => usize::MAX,
        }
    }

    /// Unpacks `src` at logical destination offset `offset`. Returns the
    /// number of bytes actually consumed; per §4.2, truncation is never
    /// reported as an error on this path, the caller is expected to have
    /// clamped `src` to the request's remaining capacity. As a safety net
    /// against a caller that didn't, contig and IOV destinations still
    /// clamp defensively rather than panicking out of bounds.
    #[inline]
    pub(crate) fn unpack(&mut self, offset: usize, src: &[u8], last: bool) -> error::Result<usize> {
        match self {
            Self::Contig(buf) => Ok(unpack_contig(buf, offset, src)),
            Self::Iov(slices) => Ok(unpack_iov(slices, offset, src)),
            Self::Generic(g) => {
                g.unpack(offset, src, last)?;
                Ok(src.len())
            }
        }
    }
}

impl core::fmt::Debug for RecvBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Contig(buf) => f.debug_tuple("Contig").field(&buf.len()).finish(),
            Self::Iov(slices) => f.debug_tuple("Iov").field(&slices.len()).finish(),
            Self::Generic(g) => f.debug_tuple("Generic").field(g).finish(),
        }
    }
}

#[inline]
fn unpack_contig(buf: &mut [u8], offset: usize, src: &[u8]) -> usize {
    let avail = buf.len().saturating_sub(offset);
    let n = avail.min(src.len());
    buf[offset..offset + n].copy_from_slice(&src[..n]);
    n
}

#[inline]
fn unpack_iov(slices: &mut [Box<[u8]>], offset: usize, src: &[u8]) -> usize {
    let mut remaining_offset = offset;
    let mut written = 0;
    let mut src = src;

    for slice in slices.iter_mut() {
        if src.is_empty() {
            break;
        }

        let slice_len = slice.len();
        if remaining_offset >= slice_len {
            remaining_offset -= slice_len;
            continue;
        }

        let start = remaining_offset;
        remaining_offset = 0;
        let avail = slice_len - start;
        let n = avail.min(src.len());
        slice[start..start + n].copy_from_slice(&src[..n]);
        written += n;
        src = &src[n..];
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contig_unpack_clamps_to_capacity() {
        let mut buf = RecvBuffer::Contig(vec![0u8; 4]);
        let n = buf.unpack(0, b"abcdef", false).unwrap();
        assert_eq!(n, 4);
        match &buf {
            RecvBuffer::Contig(b) => assert_eq!(&b[..], b"abcd"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn iov_unpack_spans_slices() {
        let mut slices: ArrayVec<Box<[u8]>, MAX_IOV> = ArrayVec::new();
        slices.push(vec![0u8; 2].into_boxed_slice());
        slices.push(vec![0u8; 3].into_boxed_slice());
        let mut buf = RecvBuffer::Iov(slices);

        let n = buf.unpack(0, b"abcde", false).unwrap();
        assert_eq!(n, 5);
        match &buf {
            RecvBuffer::Iov(slices) => {
                assert_eq!(&*slices[0], b"ab");
                assert_eq!(&*slices[1], b"cde");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn iov_unpack_resumes_mid_second_slice() {
        let mut slices: ArrayVec<Box<[u8]>, MAX_IOV> = ArrayVec::new();
        slices.push(vec![0u8; 2].into_boxed_slice());
        slices.push(vec![0u8; 3].into_boxed_slice());
        let mut buf = RecvBuffer::Iov(slices);

        buf.unpack(0, b"ab", false).unwrap();
        let n = buf.unpack(2, b"cde", false).unwrap();
        assert_eq!(n, 3);
        match &buf {
            RecvBuffer::Iov(slices) => assert_eq!(&*slices[1], b"cde"),
            _ => unreachable!(),
        }
    }
}
