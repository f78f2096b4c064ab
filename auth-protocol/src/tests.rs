// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use super::*;
use consts::{CHUNK_SIZE, FRAME_SIZE, MSC_FRAME_CAPACITY, MSC_INVALID_PACKET};
use msc::{decode_request, decode_response, encode_request, encode_response, Opcode};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(7)).collect()
}

/// Chunks `src` into data frames, pushes them through encode/decode and
/// reassembles them into a zeroed buffer of the same size.
fn transfer(src: &[u8]) -> Vec<u8> {
    let mut dst = vec![0u8; src.len()];
    for sn in 1..=chunk_count(src.len()) {
        let mut wire = [0u8; FRAME_SIZE];
        let payload = chunk(src, sn).unwrap();
        let len = Frame::Data { sn, payload }.encode(&mut wire).unwrap();
        match Frame::decode(&wire[..len]).unwrap() {
            Frame::Data { sn: got, payload } => {
                assert_eq!(got, sn);
                place_chunk(&mut dst, got, payload).unwrap();
            }
            other => panic!("expected data frame, got {other:?}"),
        }
    }
    dst
}

#[test]
fn chunks_round_trip() {
    for len in [0usize, 1, 17, 18, 19, 255, 512] {
        let src = pattern(len);
        assert_eq!(transfer(&src), src, "length {len}");
    }
}

#[test]
fn chunk_arithmetic() {
    assert_eq!(chunk_count(0), 0);
    assert_eq!(chunk_count(1), 1);
    assert_eq!(chunk_count(18), 1);
    assert_eq!(chunk_count(19), 2);
    assert_eq!(chunk_count(512), 29);

    assert_eq!(last_chunk_size(1), 1);
    assert_eq!(last_chunk_size(18), CHUNK_SIZE);
    assert_eq!(last_chunk_size(36), CHUNK_SIZE);
    assert_eq!(last_chunk_size(76), 4);

    let buf = pattern(40);
    assert_eq!(chunk(&buf, 0), None);
    assert_eq!(chunk(&buf, 3).unwrap().len(), 4);
    assert_eq!(chunk(&buf, 4), None);
}

#[test]
fn place_chunk_truncates_at_buffer_end() {
    let mut buf = [0u8; 20];
    assert_eq!(place_chunk(&mut buf, 2, &[9; CHUNK_SIZE]), Ok(2));
    assert_eq!(&buf[18..], &[9, 9]);
    assert_eq!(place_chunk(&mut buf, 3, &[1]), Err(FrameError::BufferTooSmall));
}

#[test]
fn control_frames_decode_explicitly() {
    let mut wire = [0u8; FRAME_SIZE];
    let len = Frame::Command {
        cmd: CommandCode::DevCert,
        chunks: 29,
    }
    .encode(&mut wire)
    .unwrap();
    assert_eq!(&wire[..len], &[0, 0, 0, 1, 29, 0]);

    let len = Frame::Ack {
        ack: AckCode::Lost,
        sn: 0x0102,
    }
    .encode(&mut wire)
    .unwrap();
    assert_eq!(
        Frame::decode(&wire[..len]),
        Ok(Frame::Ack {
            ack: AckCode::Lost,
            sn: 0x0102
        })
    );

    assert_eq!(Frame::decode(&[0, 0, 2, 0, 0, 0]), Err(FrameError::UnknownMode(2)));
    assert_eq!(Frame::decode(&[0, 0, 0, 9, 0, 0]), Err(FrameError::UnknownCommand(9)));
    assert_eq!(Frame::decode(&[0, 0, 1, 6, 0, 0]), Err(FrameError::UnknownAck(6)));
    assert_eq!(Frame::decode(&[0, 0, 1]), Err(FrameError::Truncated));
    assert_eq!(Frame::decode(&[1, 0]), Err(FrameError::Truncated));
    assert_eq!(Frame::decode(&[1u8; FRAME_SIZE + 1]), Err(FrameError::PayloadTooLong));
}

#[test]
fn lost_chunk_scan_finds_zeroed_chunk() {
    let mut buf = pattern(90);
    buf[0] = 0x55;
    let count = chunk_count(buf.len());
    let mut scan = LostChunkScan::new();
    assert_eq!(scan.next_lost(&buf, count), None);

    buf[36..54].fill(0);
    assert_eq!(scan.next_lost(&buf, count), Some(3));
    // The cursor does not move past a missing chunk.
    assert_eq!(scan.next_lost(&buf, count), Some(3));

    buf[36] = 0xAA;
    assert_eq!(scan.next_lost(&buf, count), None);
}

#[test]
fn lost_chunk_scan_only_moves_forward() {
    let mut buf = pattern(72);
    buf[0..2].fill(1);
    buf[54..56].fill(0);
    let mut scan = LostChunkScan::new();
    assert_eq!(scan.next_lost(&buf, 4), Some(4));

    // Chunks before the cursor are not looked at again.
    buf[0..2].fill(0);
    buf[54] = 1;
    assert_eq!(scan.next_lost(&buf, 4), None);

    scan.reset();
    assert_eq!(scan.next_lost(&buf, 4), Some(1));
}

#[test]
fn request_round_trip() {
    let mut out = [0u8; MSC_FRAME_CAPACITY];
    for (opcode, param) in [
        (Opcode::Pubkey as u8, &[][..]),
        (Opcode::Ecdhe as u8, &[0x42; 64][..]),
        (Opcode::WriteMkpk as u8, &[0x17; 511][..]),
    ] {
        let len = encode_request(opcode, param, &mut out).unwrap();
        assert_eq!(len, param.len() + 4);
        assert_eq!(decode_request(&out[..len]), Ok((opcode, param)));
    }
}

#[test]
fn request_layout() {
    let mut out = [0u8; 8];
    let len = encode_request(0x10, &[0xAA, 0x55], &mut out).unwrap();
    assert_eq!(&out[..len], &[0x00, 0x03, 0x10, 0xAA, 0x55, 0x03 ^ 0x10 ^ 0xAA ^ 0x55]);
}

#[test]
fn any_flipped_byte_fails_checksum() {
    let mut out = [0u8; MSC_FRAME_CAPACITY];
    let len = encode_request(Opcode::Sign as u8, &pattern(32), &mut out).unwrap();
    for index in 0..len {
        for mask in [0x01u8, 0x80, 0xFF] {
            let mut frame = out[..len].to_vec();
            frame[index] ^= mask;
            assert_eq!(
                decode_request(&frame),
                Err(FrameError::Checksum),
                "byte {index} mask {mask:#x}"
            );
        }
    }
}

#[test]
fn oversized_request_is_rejected() {
    let mut out = [0u8; MSC_FRAME_CAPACITY];
    assert_eq!(encode_request(0x20, &[0; 511], &mut out), Ok(515));
    assert_eq!(encode_request(0x20, &[0; 512], &mut out), Err(FrameError::ParamTooLarge));
    assert_eq!(encode_request(0x20, &[0; 4], &mut [0u8; 6]), Err(FrameError::BufferTooSmall));
}

#[test]
fn response_decoding() {
    let mut out = [0u8; MSC_FRAME_CAPACITY];
    let payload = pattern(64);
    let len = encode_response(0, &payload, &mut out).unwrap();
    assert_eq!(len, msc::response_frame_len(64));

    let response = decode_response(&out[..len], 64).unwrap();
    assert_eq!(response.status, 0);
    assert_eq!(response.payload, &payload[..]);

    assert_eq!(
        decode_response(&out[..len], 32),
        Err(FrameError::LengthMismatch {
            expected: 33,
            actual: 65
        })
    );
    assert_eq!(decode_response(&out[..10], 64), Err(FrameError::Truncated));

    let mut corrupted = out;
    corrupted[10] ^= 0x20;
    assert_eq!(decode_response(&corrupted[..len], 64), Err(FrameError::Checksum));
    assert_eq!(FrameError::Checksum.status(), 0xFF);

    let len = encode_response(MSC_INVALID_PACKET, &[0; 4], &mut out).unwrap();
    assert_eq!(decode_response(&out[..len], 4), Err(FrameError::InvalidPacket));

    let len = encode_response(0x03, &[0; 4], &mut out).unwrap();
    assert_eq!(decode_response(&out[..len], 4).map(|r| r.status), Ok(0x03));
}

#[test]
fn status_families() {
    assert_eq!(opcode::family(opcode::SHARED_LOG_START_W_CERT), opcode::SHARED_TYPE);
    assert_eq!(opcode::family(opcode::SYS_KEY_DELETE), opcode::SYS_TYPE);
    assert_eq!(opcode::REG_VERIFY_SUCC, 0x13);
}
