// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Byte stream decoder
//!
//! Received MIDI bytes arrive in chunks of arbitrary size without any
//! message framing. The decoder is fed one byte at a time and emits
//! an event whenever a byte completes a message.
//!
//! Running status, i.e. the omission of repeated status bytes for
//! consecutive channel messages of the same kind and channel, is
//! tracked explicitly. It is established by channel status bytes,
//! cancelled by system common messages, and unaffected by real-time
//! messages.
//!
//! Malformed input never results in an error. An incomplete message
//! that is interrupted by a status byte is silently dropped and the
//! decoder re-synchronizes on that status byte.

use std::mem;

use super::{
    u14_from_data_bytes, MidiEvent, CHANNEL_MASK, STATUS_ACTIVE_SENSING,
    STATUS_CHANNEL_AFTERTOUCH, STATUS_CONTINUE, STATUS_CONTROL_CHANGE, STATUS_END_OF_EXCLUSIVE,
    STATUS_NOTE_OFF, STATUS_NOTE_ON, STATUS_PITCH_WHEEL, STATUS_POLYPHONIC_AFTERTOUCH,
    STATUS_PROGRAM_CHANGE, STATUS_RESET, STATUS_SONG_POSITION_POINTER, STATUS_SONG_SELECT,
    STATUS_START, STATUS_STOP, STATUS_SYSTEM_EXCLUSIVE, STATUS_TIME_CODE_QUARTER_FRAME,
    STATUS_TIMING_CLOCK, STATUS_TUNE_REQUEST,
};


/// Parser state of a [`MidiDecoder`]
///
/// The status byte of the pending message is stored as received,
/// i.e. including the channel of channel messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// Waiting for a status byte or a data byte in running status.
    #[default]
    Idle,

    /// Waiting for the only data byte of a 2-byte message.
    AwaitingByte2 { status: u8 },

    /// Waiting for the first data byte of a 3-byte message.
    AwaitingByte2Of3 { status: u8 },

    /// Waiting for the second data byte of a 3-byte message.
    AwaitingByte3 { status: u8, byte2: u8 },

    /// Accumulating a system exclusive message, starting with `0xF0`.
    InSysex { accumulated: Vec<u8> },
}

#[must_use]
const fn is_data_byte(byte: u8) -> bool {
    byte & 0x80 == 0
}

#[must_use]
const fn is_real_time_byte(byte: u8) -> bool {
    byte >= STATUS_TIMING_CLOCK
}

/// Channel messages with 2 data bytes
#[must_use]
const fn is_three_byte_channel_status(status: u8) -> bool {
    matches!(
        status & 0xf0,
        STATUS_NOTE_OFF
            | STATUS_NOTE_ON
            | STATUS_POLYPHONIC_AFTERTOUCH
            | STATUS_CONTROL_CHANGE
            | STATUS_PITCH_WHEEL
    )
}

/// Channel messages with a single data byte
#[must_use]
const fn is_two_byte_channel_status(status: u8) -> bool {
    matches!(
        status & 0xf0,
        STATUS_PROGRAM_CHANGE | STATUS_CHANNEL_AFTERTOUCH
    )
}

fn two_byte_event(status: u8, byte2: u8) -> Option<MidiEvent> {
    let channel = status & CHANNEL_MASK;
    let event = match status & 0xf0 {
        STATUS_PROGRAM_CHANGE => MidiEvent::ProgramChange {
            channel,
            program: byte2,
        },
        STATUS_CHANNEL_AFTERTOUCH => MidiEvent::ChannelAftertouch {
            channel,
            pressure: byte2,
        },
        _ => match status {
            STATUS_TIME_CODE_QUARTER_FRAME => MidiEvent::TimeCodeQuarterFrame { value: byte2 },
            STATUS_SONG_SELECT => MidiEvent::SongSelect { song: byte2 },
            _ => {
                log::trace!("Illegal state: {status:#04x} is not a 2-byte message");
                return None;
            }
        },
    };
    Some(event)
}

fn three_byte_event(status: u8, byte2: u8, byte3: u8) -> Option<MidiEvent> {
    let channel = status & CHANNEL_MASK;
    let event = match status & 0xf0 {
        STATUS_NOTE_OFF => MidiEvent::NoteOff {
            channel,
            note: byte2,
            velocity: byte3,
        },
        STATUS_NOTE_ON => MidiEvent::NoteOn {
            channel,
            note: byte2,
            velocity: byte3,
        },
        STATUS_POLYPHONIC_AFTERTOUCH => MidiEvent::PolyphonicAftertouch {
            channel,
            note: byte2,
            pressure: byte3,
        },
        STATUS_CONTROL_CHANGE => MidiEvent::ControlChange {
            channel,
            controller: byte2,
            value: byte3,
        },
        STATUS_PITCH_WHEEL => MidiEvent::PitchWheel {
            channel,
            value: u14_from_data_bytes(byte2, byte3),
        },
        _ if status == STATUS_SONG_POSITION_POINTER => MidiEvent::SongPositionPointer {
            position: u14_from_data_bytes(byte2, byte3),
        },
        _ => {
            log::trace!("Illegal state: {status:#04x} is not a 3-byte message");
            return None;
        }
    };
    Some(event)
}

/// Per-endpoint MIDI byte stream decoder
#[derive(Debug, Clone, Default)]
pub struct MidiDecoder {
    state: DecoderState,
    running_status: Option<u8>,
    max_sysex_len: Option<usize>,
}

impl MidiDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the size of accumulated system exclusive messages.
    ///
    /// Longer messages are discarded. The limit includes both the
    /// leading `0xF0` and the trailing `0xF7`.
    #[must_use]
    pub const fn with_max_sysex_len(mut self, max_sysex_len: Option<usize>) -> Self {
        self.max_sysex_len = max_sysex_len;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &DecoderState {
        &self.state
    }

    /// The status byte that is applied to data bytes without a preceding status byte.
    #[must_use]
    pub const fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// Discard any pending message and the running status.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.running_status = None;
    }

    /// Feed the next received byte.
    ///
    /// Returns the decoded event if the byte completed a message.
    pub fn feed(&mut self, byte: u8) -> Option<MidiEvent> {
        if is_real_time_byte(byte) {
            return self.feed_real_time(byte);
        }
        match mem::take(&mut self.state) {
            DecoderState::Idle => self.feed_idle(byte),
            DecoderState::AwaitingByte2 { status } => {
                if is_data_byte(byte) {
                    two_byte_event(status, byte)
                } else {
                    self.abort_pending(status, byte)
                }
            }
            DecoderState::AwaitingByte2Of3 { status } => {
                if is_data_byte(byte) {
                    self.state = DecoderState::AwaitingByte3 {
                        status,
                        byte2: byte,
                    };
                    None
                } else {
                    self.abort_pending(status, byte)
                }
            }
            DecoderState::AwaitingByte3 { status, byte2 } => {
                if is_data_byte(byte) {
                    three_byte_event(status, byte2, byte)
                } else {
                    self.abort_pending(status, byte)
                }
            }
            DecoderState::InSysex { accumulated } => self.feed_sysex(accumulated, byte),
        }
    }

    /// Decode a chunk of received bytes lazily.
    pub fn decode<'a>(&'a mut self, input: &'a [u8]) -> impl Iterator<Item = MidiEvent> + 'a {
        input.iter().filter_map(move |&byte| self.feed(byte))
    }

    fn abort_pending(&mut self, status: u8, byte: u8) -> Option<MidiEvent> {
        log::trace!("Dropping incomplete message {status:#04x} on status byte {byte:#04x}");
        debug_assert_eq!(self.state, DecoderState::Idle);
        self.feed_idle(byte)
    }

    fn feed_real_time(&mut self, byte: u8) -> Option<MidiEvent> {
        let event = match byte {
            STATUS_TIMING_CLOCK => MidiEvent::TimingClock,
            STATUS_START => MidiEvent::Start,
            STATUS_CONTINUE => MidiEvent::Continue,
            STATUS_STOP => MidiEvent::Stop,
            STATUS_ACTIVE_SENSING => MidiEvent::ActiveSensing,
            STATUS_RESET => {
                if self.state != DecoderState::Idle {
                    log::trace!("Dropping incomplete message on reset");
                }
                self.reset();
                MidiEvent::Reset
            }
            // 0xF9 and 0xFD are undefined
            _ => return None,
        };
        Some(event)
    }

    fn feed_idle(&mut self, byte: u8) -> Option<MidiEvent> {
        debug_assert!(!is_real_time_byte(byte));
        if is_data_byte(byte) {
            return self.feed_running_status(byte);
        }
        if is_three_byte_channel_status(byte) {
            self.running_status = Some(byte);
            self.state = DecoderState::AwaitingByte2Of3 { status: byte };
            return None;
        }
        if is_two_byte_channel_status(byte) {
            self.running_status = Some(byte);
            self.state = DecoderState::AwaitingByte2 { status: byte };
            return None;
        }
        // System common messages cancel the running status
        self.running_status = None;
        match byte {
            STATUS_SYSTEM_EXCLUSIVE => {
                self.state = DecoderState::InSysex {
                    accumulated: vec![byte],
                };
                None
            }
            STATUS_TIME_CODE_QUARTER_FRAME | STATUS_SONG_SELECT => {
                self.state = DecoderState::AwaitingByte2 { status: byte };
                None
            }
            STATUS_SONG_POSITION_POINTER => {
                self.state = DecoderState::AwaitingByte2Of3 { status: byte };
                None
            }
            STATUS_TUNE_REQUEST => Some(MidiEvent::TuneRequest),
            _ => {
                // 0xF4, 0xF5 (undefined) and 0xF7 without a preceding 0xF0
                log::trace!("Ignoring unexpected status byte {byte:#04x}");
                None
            }
        }
    }

    fn feed_running_status(&mut self, byte: u8) -> Option<MidiEvent> {
        let Some(status) = self.running_status else {
            log::trace!("Ignoring data byte {byte:#04x} without running status");
            return None;
        };
        if is_two_byte_channel_status(status) {
            return two_byte_event(status, byte);
        }
        debug_assert!(is_three_byte_channel_status(status));
        self.state = DecoderState::AwaitingByte3 {
            status,
            byte2: byte,
        };
        None
    }

    fn feed_sysex(&mut self, mut accumulated: Vec<u8>, byte: u8) -> Option<MidiEvent> {
        debug_assert_eq!(accumulated.first(), Some(&STATUS_SYSTEM_EXCLUSIVE));
        accumulated.push(byte);
        if byte == STATUS_END_OF_EXCLUSIVE {
            // Both the leading 0xF0 and the trailing 0xF7 are included
            if accumulated.len() <= 2 {
                log::trace!("Ignoring empty system exclusive message");
                return None;
            }
            return Some(MidiEvent::SystemExclusive { data: accumulated });
        }
        if self
            .max_sysex_len
            .is_some_and(|max_sysex_len| accumulated.len() >= max_sysex_len)
        {
            log::debug!(
                "Discarding system exclusive message that exceeds {max_len} bytes",
                max_len = accumulated.len()
            );
            return None;
        }
        // Status bytes other than 0xF7 are accumulated as data
        self.state = DecoderState::InSysex { accumulated };
        None
    }
}
