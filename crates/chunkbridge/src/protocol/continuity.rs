// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session continuity classification.
//!
//! [`classify`] is a pure decision over the current header and the previous
//! session/sequence numbers. [`SessionTracker`] owns those previous numbers
//! for one connection.

use super::header::SessionHeader;

/// Role of the current fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuity {
    /// Fragment follows the previous one (or starts a new message).
    pub session_continuous: bool,
    /// Fragment begins a new message (or a gap was detected).
    pub new_sequence: bool,
    /// Fragment is the last of its message.
    pub last_in_sequence: bool,
}

impl Continuity {
    /// Gap or session mismatch.
    pub fn is_desync(&self) -> bool {
        !self.session_continuous
    }
}

/// Classify a fragment against the previous session/sequence numbers.
///
/// A fragment with sequence 0 always starts a new message. Otherwise it must
/// belong to the same session (0 matches any) and carry `previous + 1`.
pub fn classify(
    transmission_state: u8,
    session_number: u32,
    sequence_number: u32,
    previous_session: u32,
    previous_sequence: u32,
) -> Continuity {
    let last_in_sequence = transmission_state == super::LAST_FRAGMENT;
    let start_sequence = sequence_number == 0;
    let same_session = session_number == previous_session || session_number == 0;
    let sequence_continuous = sequence_number == previous_sequence.wrapping_add(1);

    let (session_continuous, new_sequence) = if start_sequence {
        (true, true)
    } else if same_session && sequence_continuous {
        (true, false)
    } else {
        (false, true)
    };

    Continuity {
        session_continuous,
        new_sequence,
        last_in_sequence,
    }
}

/// Previous session/sequence numbers for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTracker {
    previous_session: u32,
    previous_sequence: u32,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `header`, then remember its numbers.
    pub fn observe(&mut self, header: &SessionHeader) -> Continuity {
        let continuity = classify(
            header.transmission_state,
            header.session_number,
            header.sequence_number,
            self.previous_session,
            self.previous_sequence,
        );

        self.previous_session = header.session_number;
        self.previous_sequence = header.sequence_number;

        continuity
    }

    /// Forget the previous numbers (back to zero).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn previous_session(&self) -> u32 {
        self.previous_session
    }

    pub fn previous_sequence(&self) -> u32 {
        self.previous_sequence
    }
}
