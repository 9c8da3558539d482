// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bitset types shared across the engine, following the style of
//! `s2n-quic-dc`'s `TransportFeatures` (`stream.rs`): small `bitflags` sets
//! rather than individual `bool` fields.

bitflags::bitflags! {
    /// Flags on a [`crate::descriptor::Descriptor`] (§3 "Receive Descriptor").
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DescriptorFlags: u8 {
        /// The descriptor's storage was borrowed directly from the transport
        /// rather than copied into the internal buffer pool.
        const FROM_TRANSPORT_DESC = 1;
    }
}

bitflags::bitflags! {
    /// Flags on a [`crate::request::Request`] (§3 "Receive Request").
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RequestFlags: u8 {
        /// The request was posted and is expected to be matched against
        /// future fragments (as opposed to already satisfied inline).
        const EXPECTED       = 1 << 0;
        /// A completion callback was supplied and must be invoked exactly
        /// once.
        const CALLBACK       = 1 << 1;
        /// The request does not complete until its buffer is fully filled.
        const WAITALL        = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Flags on [`crate::endpoint::Endpoint`] (§4.1, §4.5).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EndpointFlags: u8 {
        /// The endpoint is registered on the ready list.
        const IS_QUEUED = 1 << 0;
        /// The endpoint has transitioned to "usable" (`ep_activate` has been
        /// called, or will be gated on until it is).
        const IS_ACTIVE = 1 << 1;
    }
}
