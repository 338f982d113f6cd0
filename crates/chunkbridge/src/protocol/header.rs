// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session header codec and frame encoder.

use super::{LAST_FRAGMENT, MAX_FRAME_SIZE, PAYLOAD_OFFSET, SESSION_HEADER_SIZE};
use thiserror::Error;

/// Framing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("session header needs {need} bytes, got {0}", need = SESSION_HEADER_SIZE)]
    HeaderTooShort(usize),

    #[error("frame length {0} below minimum {min}", min = PAYLOAD_OFFSET)]
    FrameTooShort(usize),

    #[error("frame length {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("fragment size must be non-zero")]
    EmptyFragmentSize,
}

/// Decoded session layer of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionHeader {
    /// 1 = last fragment of the logical message.
    pub transmission_state: u8,
    /// Logical session (0 matches any session).
    pub session_number: u32,
    /// 0-based fragment index within the session.
    pub sequence_number: u32,
}

impl SessionHeader {
    pub fn new(transmission_state: u8, session_number: u32, sequence_number: u32) -> Self {
        Self {
            transmission_state,
            session_number,
            sequence_number,
        }
    }

    /// Decode the 23-byte session layer.
    ///
    /// Only the first 9 bytes carry state; type id, source id and the
    /// reserved field are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < SESSION_HEADER_SIZE {
            return Err(FrameError::HeaderTooShort(bytes.len()));
        }

        Ok(Self {
            transmission_state: bytes[0],
            session_number: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            sequence_number: u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
        })
    }

    /// Encode into a 23-byte session layer (ignored fields zeroed).
    pub fn encode(&self) -> [u8; SESSION_HEADER_SIZE] {
        let mut out = [0u8; SESSION_HEADER_SIZE];
        out[0] = self.transmission_state;
        out[1..5].copy_from_slice(&self.session_number.to_le_bytes());
        out[5..9].copy_from_slice(&self.sequence_number.to_le_bytes());
        out
    }

    /// Whether this fragment closes its message.
    pub fn is_last(&self) -> bool {
        self.transmission_state == LAST_FRAGMENT
    }
}

/// Check a transport length against `[PAYLOAD_OFFSET, max]`.
pub fn check_frame_length(len: usize, max: usize) -> Result<(), FrameError> {
    if len < PAYLOAD_OFFSET {
        return Err(FrameError::FrameTooShort(len));
    }
    if len > max {
        return Err(FrameError::FrameTooLarge { len, max });
    }
    Ok(())
}

/// Build one complete wire frame around a body fragment.
pub fn encode_frame(header: &SessionHeader, body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = PAYLOAD_OFFSET + body.len();
    check_frame_length(len, MAX_FRAME_SIZE)?;

    let mut frame = Vec::with_capacity(len);
    frame.extend_from_slice(&(len as u16).to_le_bytes());
    frame.extend_from_slice(&header.encode());
    // chunk prefix: body length
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(body);
    debug_assert_eq!(frame.len(), len);
    Ok(frame)
}

/// Split a document into numbered frames of at most `fragment_size` body bytes.
///
/// An empty document still produces one (empty, last) frame.
pub fn fragment_message(
    session_number: u32,
    document: &[u8],
    fragment_size: usize,
) -> Result<Vec<Vec<u8>>, FrameError> {
    if fragment_size == 0 {
        return Err(FrameError::EmptyFragmentSize);
    }

    if document.is_empty() {
        let header = SessionHeader::new(LAST_FRAGMENT, session_number, 0);
        return Ok(vec![encode_frame(&header, &[])?]);
    }

    let count = document.len().div_ceil(fragment_size);
    document
        .chunks(fragment_size)
        .enumerate()
        .map(|(i, body)| {
            let state = if i + 1 == count { LAST_FRAGMENT } else { 0 };
            let header = SessionHeader::new(state, session_number, i as u32);
            encode_frame(&header, body)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TRANSPORT_HEADER_SIZE;

    #[test]
    fn test_decode_fields() {
        let mut bytes = [0u8; SESSION_HEADER_SIZE];
        bytes[0] = 1;
        bytes[1..5].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        bytes[5..9].copy_from_slice(&7u32.to_le_bytes());
        // type id / source id / reserved are noise
        bytes[9..].fill(0xAA);

        let header = SessionHeader::decode(&bytes).expect("decode");
        assert_eq!(header.transmission_state, 1);
        assert_eq!(header.session_number, 0xDEAD_BEEF);
        assert_eq!(header.sequence_number, 7);
        assert!(header.is_last());
    }

    #[test]
    fn test_decode_too_short() {
        let err = SessionHeader::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(err, FrameError::HeaderTooShort(10));
    }

    #[test]
    fn test_non_one_state_is_not_last() {
        for state in [0u8, 2, 0xFF] {
            assert!(!SessionHeader::new(state, 1, 1).is_last());
        }
    }

    #[test]
    fn test_encode_frame_layout() {
        let header = SessionHeader::new(1, 3, 0);
        let frame = encode_frame(&header, b"{}").expect("encode");

        assert_eq!(frame.len(), PAYLOAD_OFFSET + 2);
        assert_eq!(u16::from_le_bytes([frame[0], frame[1]]) as usize, frame.len());
        assert_eq!(frame[2], 1);
        assert_eq!(&frame[3..7], &3u32.to_le_bytes());
        assert_eq!(&frame[7..11], &0u32.to_le_bytes());
        assert_eq!(&frame[PAYLOAD_OFFSET..], b"{}");
    }

    #[test]
    fn test_encode_frame_too_large() {
        let body = vec![b'x'; MAX_FRAME_SIZE];
        let err = encode_frame(&SessionHeader::default(), &body).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_check_frame_length_bounds() {
        assert_eq!(check_frame_length(28, 4096), Err(FrameError::FrameTooShort(28)));
        assert!(check_frame_length(PAYLOAD_OFFSET, 4096).is_ok());
        assert!(check_frame_length(4096, 4096).is_ok());
        assert_eq!(
            check_frame_length(4097, 4096),
            Err(FrameError::FrameTooLarge { len: 4097, max: 4096 })
        );
    }

    #[test]
    fn test_fragment_message_numbering() {
        let frames = fragment_message(9, b"abcdefgh", 3).expect("fragment");
        assert_eq!(frames.len(), 3);

        let headers: Vec<_> = frames
            .iter()
            .map(|f| SessionHeader::decode(&f[TRANSPORT_HEADER_SIZE..]).expect("decode"))
            .collect();

        assert_eq!(headers[0], SessionHeader::new(0, 9, 0));
        assert_eq!(headers[1], SessionHeader::new(0, 9, 1));
        assert_eq!(headers[2], SessionHeader::new(1, 9, 2));
        assert_eq!(&frames[2][PAYLOAD_OFFSET..], b"gh");
    }

    #[test]
    fn test_fragment_empty_document() {
        let frames = fragment_message(1, b"", 16).expect("fragment");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), PAYLOAD_OFFSET);
    }

    #[test]
    fn test_fragment_zero_size_rejected() {
        assert_eq!(
            fragment_message(1, b"abc", 0).unwrap_err(),
            FrameError::EmptyFragmentSize
        );
    }
}
