// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection stream reassembler.
//!
//! TCP delivers the chunk protocol in arbitrary-sized reads. The reassembler
//! buffers raw bytes, cuts them into frames using the transport length,
//! classifies each fragment with a [`SessionTracker`] and accumulates the
//! JSON body until the last fragment of a message arrives.
//!
//! ```text
//!          start (seq 0, not last)          continue (in order)
//!   EMPTY ─────────────────────────▶ ACCUMULATING ◀──────┐
//!     ▲  ◀───── finish (in order, last) ──┘    └─────────┘
//!     └── single (seq 0, last) / desync / resync
//! ```
//!
//! Protocol errors (transport length outside `[MIN_FRAME_SIZE, max]`) drop
//! every buffered byte and reset the session; the next read starts clean.

use crate::protocol::{
    check_frame_length, Continuity, FrameError, SessionHeader, SessionTracker,
    DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE, PAYLOAD_OFFSET, TRANSPORT_HEADER_SIZE,
};
use tracing::{trace, warn};

/// Reassembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No message in progress.
    Empty,
    /// A message started and awaits more fragments.
    Accumulating,
}

/// Counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Frames cut from the byte stream.
    pub frames_decoded: u64,
    /// Complete messages handed out.
    pub messages_emitted: u64,
    /// Bytes of complete messages handed out.
    pub bytes_emitted: u64,
    /// Sequence gaps and session mismatches.
    pub desyncs: u64,
    /// Frames with an out-of-range transport length.
    pub resyncs: u64,
    /// Messages abandoned because a new one started.
    pub incomplete_discarded: u64,
    /// Complete messages dropped for not being UTF-8.
    pub invalid_utf8: u64,
}

/// Reassembles chunk-protocol messages from a byte stream.
#[derive(Debug)]
pub struct StreamReassembler {
    raw: Vec<u8>,
    payload: Vec<u8>,
    state: State,
    tracker: SessionTracker,
    max_frame_size: usize,
    stats: ReassemblerStats,
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl StreamReassembler {
    /// Create a reassembler accepting frames up to `max_frame_size` bytes.
    ///
    /// The bound is clamped to what the u16 length field can express.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            raw: Vec::with_capacity(max_frame_size.min(MAX_FRAME_SIZE) * 2),
            payload: Vec::new(),
            state: State::Empty,
            tracker: SessionTracker::new(),
            max_frame_size: max_frame_size.clamp(MIN_FRAME_SIZE, MAX_FRAME_SIZE),
            stats: ReassemblerStats::default(),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Raw bytes waiting for the rest of their frame.
    pub fn buffered_len(&self) -> usize {
        self.raw.len()
    }

    /// Whether a message is in progress.
    pub fn is_accumulating(&self) -> bool {
        self.state == State::Accumulating
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Feed one socket read and collect every message it completes, in order.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.raw.extend_from_slice(data);

        let raw = std::mem::take(&mut self.raw);
        let mut messages = Vec::new();
        let mut offset = 0;

        loop {
            let available = &raw[offset..];
            if available.len() < TRANSPORT_HEADER_SIZE {
                break;
            }

            let frame_len = u16::from_le_bytes([available[0], available[1]]) as usize;
            if let Err(e) = check_frame_length(frame_len, self.max_frame_size) {
                self.resync(&e, raw.len() - offset);
                return messages;
            }

            if available.len() < frame_len {
                break;
            }

            if let Some(message) = self.process_frame(&available[..frame_len]) {
                messages.push(message);
            }
            offset += frame_len;
        }

        self.raw = raw;
        self.raw.drain(..offset);
        messages
    }

    /// Drop all buffered state, as on a fresh connection.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.discard_payload();
        self.tracker.reset();
    }

    fn process_frame(&mut self, frame: &[u8]) -> Option<String> {
        self.stats.frames_decoded += 1;

        let header = match SessionHeader::decode(&frame[TRANSPORT_HEADER_SIZE..]) {
            Ok(header) => header,
            Err(e) => {
                warn!("Undecodable session header: {}", e);
                return None;
            }
        };
        let continuity = self.tracker.observe(&header);
        let body = &frame[PAYLOAD_OFFSET..];

        trace!(
            "Frame len={} state={} session={} seq={} -> {:?}",
            frame.len(),
            header.transmission_state,
            header.session_number,
            header.sequence_number,
            continuity
        );

        match continuity {
            Continuity {
                session_continuous: false,
                ..
            } => {
                self.desync(&header, "sequence gap or session mismatch");
                None
            }
            Continuity {
                new_sequence: true,
                last_in_sequence,
                ..
            } => {
                if self.state == State::Accumulating {
                    self.stats.incomplete_discarded += 1;
                    warn!(
                        "Session {} restarted before completion, discarding {} bytes",
                        header.session_number,
                        self.payload.len()
                    );
                }
                self.payload.clear();
                self.payload.extend_from_slice(body);

                if last_in_sequence {
                    self.flush()
                } else {
                    self.state = State::Accumulating;
                    None
                }
            }
            Continuity {
                new_sequence: false,
                last_in_sequence,
                ..
            } => {
                if self.state == State::Empty {
                    // the start of this message was never seen
                    self.desync(&header, "continuation without a start fragment");
                    return None;
                }
                self.payload.extend_from_slice(body);

                if last_in_sequence {
                    self.flush()
                } else {
                    None
                }
            }
        }
    }

    fn flush(&mut self) -> Option<String> {
        let bytes = std::mem::take(&mut self.payload);
        self.state = State::Empty;

        match String::from_utf8(bytes) {
            Ok(message) => {
                self.stats.messages_emitted += 1;
                self.stats.bytes_emitted += message.len() as u64;
                Some(message)
            }
            Err(e) => {
                self.stats.invalid_utf8 += 1;
                warn!("Dropping reassembled message: {}", e);
                None
            }
        }
    }

    fn desync(&mut self, header: &SessionHeader, reason: &str) {
        self.stats.desyncs += 1;
        warn!(
            "Missed fragment ({}) at session {} seq {}, resetting",
            reason, header.session_number, header.sequence_number
        );
        self.discard_payload();
        self.tracker.reset();
    }

    fn resync(&mut self, error: &FrameError, dropped: usize) {
        self.stats.resyncs += 1;
        warn!("Bad frame ({}), dropping {} buffered bytes", error, dropped);
        self.reset();
    }

    fn discard_payload(&mut self) {
        self.payload.clear();
        self.state = State::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, fragment_message, LAST_FRAGMENT};

    fn frame(state: u8, session: u32, seq: u32, body: &str) -> Vec<u8> {
        encode_frame(&SessionHeader::new(state, session, seq), body.as_bytes()).expect("encode")
    }

    fn push_all(r: &mut StreamReassembler, frames: &[Vec<u8>]) -> Vec<String> {
        frames.iter().flat_map(|f| r.push(f)).collect()
    }

    #[test]
    fn test_single_fragment_message() {
        let mut r = StreamReassembler::default();
        let out = r.push(&frame(LAST_FRAGMENT, 1, 0, r#"{"A":1}"#));

        assert_eq!(out, vec![r#"{"A":1}"#.to_string()]);
        assert!(!r.is_accumulating());
        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.stats().messages_emitted, 1);
    }

    #[test]
    fn test_multi_fragment_concatenation() {
        let doc = r#"{"Pressure":{"values":[1,2,3,4,5,6,7,8,9,10]}}"#;
        let frames = fragment_message(4, doc.as_bytes(), 7).expect("fragment");
        assert!(frames.len() > 3);

        let mut r = StreamReassembler::default();
        let out = push_all(&mut r, &frames);

        assert_eq!(out, vec![doc.to_string()]);
        assert_eq!(r.stats().frames_decoded, frames.len() as u64);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let doc = r#"{"Temperature":{"v":21}}"#;
        let stream: Vec<u8> = fragment_message(2, doc.as_bytes(), 5)
            .expect("fragment")
            .concat();

        let mut r = StreamReassembler::default();
        let mut out = Vec::new();
        for byte in &stream {
            out.extend(r.push(std::slice::from_ref(byte)));
        }

        assert_eq!(out, vec![doc.to_string()]);
    }

    #[test]
    fn test_many_frames_in_one_read() {
        let mut stream = frame(LAST_FRAGMENT, 1, 0, r#"{"A":1}"#);
        stream.extend(frame(0, 2, 0, r#"{"B":"#));
        stream.extend(frame(LAST_FRAGMENT, 2, 1, "2}"));
        stream.extend(frame(LAST_FRAGMENT, 3, 0, r#"{"C":3}"#));
        // half of a fourth frame
        let tail = frame(LAST_FRAGMENT, 4, 0, r#"{"D":4}"#);
        stream.extend(&tail[..10]);

        let mut r = StreamReassembler::default();
        let out = r.push(&stream);
        assert_eq!(out, vec![r#"{"A":1}"#, r#"{"B":2}"#, r#"{"C":3}"#]);
        assert_eq!(r.buffered_len(), 10);

        let out = r.push(&tail[10..]);
        assert_eq!(out, vec![r#"{"D":4}"#]);
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn test_sequence_gap_discards_message() {
        let mut r = StreamReassembler::default();
        let out = push_all(
            &mut r,
            &[
                frame(0, 7, 0, r#"{"X":"#),
                frame(0, 7, 1, "[1,"),
                frame(LAST_FRAGMENT, 7, 3, "3]}"),
            ],
        );

        assert!(out.is_empty());
        assert!(!r.is_accumulating());
        assert_eq!(r.stats().desyncs, 1);

        // the next start fragment begins cleanly
        let out = push_all(
            &mut r,
            &[frame(0, 8, 0, r#"{"Y":"#), frame(LAST_FRAGMENT, 8, 1, "2}")],
        );
        assert_eq!(out, vec![r#"{"Y":2}"#]);
    }

    #[test]
    fn test_session_mismatch_discards_message() {
        let mut r = StreamReassembler::default();
        let out = push_all(
            &mut r,
            &[frame(0, 7, 0, r#"{"X":"#), frame(LAST_FRAGMENT, 9, 1, "1}")],
        );
        assert!(out.is_empty());
        assert_eq!(r.stats().desyncs, 1);
    }

    #[test]
    fn test_wildcard_session_continuation() {
        let mut r = StreamReassembler::default();
        let out = push_all(
            &mut r,
            &[frame(0, 7, 0, r#"{"W":"#), frame(LAST_FRAGMENT, 0, 1, "0}")],
        );
        assert_eq!(out, vec![r#"{"W":0}"#]);
    }

    #[test]
    fn test_restart_discards_incomplete_message() {
        let mut r = StreamReassembler::default();
        let out = push_all(
            &mut r,
            &[
                frame(0, 1, 0, r#"{"Lost":"#),
                frame(0, 2, 0, r#"{"Kept":"#),
                frame(LAST_FRAGMENT, 2, 1, "true}"),
            ],
        );

        assert_eq!(out, vec![r#"{"Kept":true}"#]);
        assert_eq!(r.stats().incomplete_discarded, 1);
    }

    #[test]
    fn test_continuation_without_start_is_dropped() {
        let mut r = StreamReassembler::default();
        // fresh tracker remembers (0, 0), so this looks in order
        let out = r.push(&frame(LAST_FRAGMENT, 0, 1, "tail}"));
        assert!(out.is_empty());
        assert_eq!(r.stats().desyncs, 1);
    }

    #[test]
    fn test_oversized_frame_resyncs() {
        let mut r = StreamReassembler::new(64);
        let mut stream = vec![0xFF, 0x0F]; // 4095 > 64
        stream.extend_from_slice(&[0u8; 40]);

        assert!(r.push(&stream).is_empty());
        assert_eq!(r.stats().resyncs, 1);
        assert_eq!(r.buffered_len(), 0);

        let out = r.push(&frame(LAST_FRAGMENT, 1, 0, r#"{"A":1}"#));
        assert_eq!(out, vec![r#"{"A":1}"#]);
    }

    #[test]
    fn test_undersized_frame_resyncs() {
        let mut r = StreamReassembler::default();
        r.push(&frame(0, 1, 0, r#"{"A":"#));
        assert!(r.is_accumulating());

        // zero length would never advance the buffer
        assert!(r.push(&[0, 0, 1, 2, 3]).is_empty());
        assert_eq!(r.stats().resyncs, 1);
        assert!(!r.is_accumulating());
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn test_invalid_utf8_dropped() {
        let mut r = StreamReassembler::default();
        let bad = encode_frame(&SessionHeader::new(LAST_FRAGMENT, 1, 0), &[0xC3, 0x28])
            .expect("encode");
        assert!(r.push(&bad).is_empty());
        assert_eq!(r.stats().invalid_utf8, 1);

        let out = r.push(&frame(LAST_FRAGMENT, 1, 0, r#"{"Ok":1}"#));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_empty_body_frames() {
        let mut r = StreamReassembler::default();
        let out = push_all(
            &mut r,
            &[
                frame(0, 3, 0, ""),
                frame(0, 3, 1, r#"{"E":1}"#),
                frame(LAST_FRAGMENT, 3, 2, ""),
            ],
        );
        assert_eq!(out, vec![r#"{"E":1}"#]);
    }

    #[test]
    fn test_stats_bytes() {
        let mut r = StreamReassembler::default();
        push_all(
            &mut r,
            &[
                frame(LAST_FRAGMENT, 1, 0, r#"{"A":1}"#),
                frame(LAST_FRAGMENT, 1, 0, r#"{"BB":22}"#),
            ],
        );
        let stats = r.stats();
        assert_eq!(stats.messages_emitted, 2);
        assert_eq!(stats.bytes_emitted, 7 + 9);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut r = StreamReassembler::default();
        let partial = frame(0, 1, 0, r#"{"A":"#);
        r.push(&partial);
        r.push(&partial[..5]);
        assert!(r.is_accumulating());
        assert_eq!(r.buffered_len(), 5);

        r.reset();
        assert!(!r.is_accumulating());
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn test_max_frame_size_clamped() {
        assert_eq!(StreamReassembler::new(1).max_frame_size(), MIN_FRAME_SIZE);
        assert_eq!(StreamReassembler::new(1 << 20).max_frame_size(), MAX_FRAME_SIZE);
    }
}
