// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunk wire protocol.
//!
//! Every TCP frame carries one fragment of a JSON document:
//!
//! ```text
//! offset 0   u16 LE   transport length (whole frame, length bytes included)
//! offset 2   u8       transmission state (1 = last fragment)
//! offset 3   u32 LE   session number (0 = wildcard)
//! offset 7   u32 LE   sequence number (0 = first fragment)
//! offset 11  [4]u8    message type id (ignored)
//! offset 15  [6]u8    source id (ignored)
//! offset 21  [4]u8    reserved
//! offset 25  [4]u8    chunk prefix (skipped)
//! offset 29  bytes    JSON fragment
//! ```

pub mod continuity;
pub mod header;

pub use continuity::{classify, Continuity, SessionTracker};
pub use header::{check_frame_length, encode_frame, fragment_message, FrameError, SessionHeader};

/// Size of the transport length prefix.
pub const TRANSPORT_HEADER_SIZE: usize = 2;

/// Size of the session layer.
pub const SESSION_HEADER_SIZE: usize = 23;

/// Bytes between the end of the session layer and the JSON body.
pub const CHUNK_PREFIX_SIZE: usize = 4;

/// Offset of the JSON fragment inside a frame.
pub const PAYLOAD_OFFSET: usize = TRANSPORT_HEADER_SIZE + SESSION_HEADER_SIZE + CHUNK_PREFIX_SIZE;

/// Smallest valid frame (empty body).
pub const MIN_FRAME_SIZE: usize = PAYLOAD_OFFSET;

/// Largest frame the u16 length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Default socket read chunk.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 512;

/// Default safety bound for a single frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;

/// Transmission state value marking the last fragment of a message.
pub const LAST_FRAGMENT: u8 = 1;
