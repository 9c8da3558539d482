// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Property tests for the byte-conservation and granularity invariants
//! (§8 items 1 and 5), across randomized fragment splits. Mirrors the
//! `bolero::check!().with_type::<T>().for_each(...)` invocation shape used
//! throughout the teacher's storage tests.

use stream_recv_engine::{RecvBuffer, RecvParams, RecvStatus, Worker, WorkerConfig};

const FRAGMENT_SIZE: usize = 7;
const MAX_PAYLOAD: usize = 4096;

fn deliver_in_fragments(worker: &mut Worker<()>, endpoint_id: u64, payload: &[u8]) {
    for chunk in payload.chunks(FRAGMENT_SIZE) {
        worker.am_handler(endpoint_id, chunk.to_vec(), 0, false);
    }
}

fn waitall_params() -> RecvParams<()> {
    RecvParams {
        elem_size: 1,
        waitall: true,
        force_imm_cmpl: false,
        no_imm_cmpl: false,
        expected_len: None,
        cookie: (),
        callback: None,
    }
}

/// §8 item 1: for any sequence of inbound fragments totalling B bytes and
/// a single WAITALL receive for exactly B bytes, the unpacked output
/// equals the input, regardless of how the input was fragmented.
#[test]
fn byte_conservation_across_arbitrary_fragment_splits() {
    bolero::check!().with_type::<Vec<u8>>().for_each(|payload| {
        let payload: &[u8] = payload.as_ref();
        if payload.is_empty() || payload.len() > MAX_PAYLOAD {
            return;
        }

        let mut worker: Worker<()> = Worker::new(WorkerConfig::default());
        let key = worker.ep_init(1);
        worker.ep_activate(key);

        let status = worker
            .recv(1, RecvBuffer::Contig(vec![0u8; payload.len()]), waitall_params())
            .unwrap();
        let handle = match status {
            RecvStatus::Posted(h) => h,
            _ => panic!("a non-empty waitall receive with no data yet must post"),
        };

        deliver_in_fragments(&mut worker, 1, payload);

        let completion = handle
            .try_take()
            .expect("waitall request should complete once all bytes have arrived");
        assert_eq!(completion.length, payload.len());
        match completion.buffer {
            RecvBuffer::Contig(buf) => assert_eq!(&buf[..], payload),
            _ => unreachable!(),
        }
    });
}

/// §8 item 5: for a contig request without WAITALL, every completion
/// length is a multiple of elem_size unless it equals the request's full
/// length.
#[test]
fn granularity_never_completes_off_boundary() {
    bolero::check!()
        .with_type::<(Vec<u8>, u8)>()
        .for_each(|(payload, raw_elem_size)| {
            let payload: &[u8] = payload.as_ref();
            if payload.is_empty() || payload.len() > MAX_PAYLOAD {
                return;
            }
            let elem_size = (*raw_elem_size as usize % 8) + 1;

            let mut worker: Worker<()> = Worker::new(WorkerConfig::default());
            let key = worker.ep_init(1);
            worker.ep_activate(key);

            let params = RecvParams {
                elem_size,
                waitall: false,
                force_imm_cmpl: false,
                no_imm_cmpl: false,
                expected_len: None,
                cookie: (),
                callback: None,
            };
            let status = worker
                .recv(1, RecvBuffer::Contig(vec![0u8; payload.len()]), params)
                .unwrap();
            let handle = match status {
                RecvStatus::Posted(h) => h,
                RecvStatus::Completed(completion) => {
                    assert!(completion.length == payload.len() || completion.length % elem_size == 0);
                    return;
                }
                RecvStatus::Dispatched => unreachable!("no callback was supplied"),
            };

            deliver_in_fragments(&mut worker, 1, payload);

            if let Some(completion) = handle.try_take() {
                assert!(
                    completion.length == payload.len() || completion.length % elem_size == 0,
                    "completion length {} is neither full ({}) nor a multiple of elem_size {}",
                    completion.length,
                    payload.len(),
                    elem_size,
                );
            }
        });
}
