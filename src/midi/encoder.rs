// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Wire format encoding of outbound messages
//!
//! All inputs are masked to their valid bit ranges instead of being
//! rejected, i.e. channels to 4 bits, data bytes to 7 bits, and
//! 14-bit values to 14 bits.

use super::{
    u14_to_data_bytes, MidiEvent, CHANNEL_MASK, DATA_MASK, STATUS_ACTIVE_SENSING,
    STATUS_CHANNEL_AFTERTOUCH, STATUS_CONTINUE, STATUS_CONTROL_CHANGE, STATUS_NOTE_OFF,
    STATUS_NOTE_ON, STATUS_PITCH_WHEEL, STATUS_POLYPHONIC_AFTERTOUCH, STATUS_PROGRAM_CHANGE,
    STATUS_RESET, STATUS_SONG_POSITION_POINTER, STATUS_SONG_SELECT, STATUS_START, STATUS_STOP,
    STATUS_TIME_CODE_QUARTER_FRAME, STATUS_TIMING_CLOCK, STATUS_TUNE_REQUEST,
};

/// Encoded bytes of a single message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Messages with 1, 2, or 3 bytes.
    Short { bytes: [u8; 3], len: u8 },

    /// System exclusive messages, passed through as provided.
    SysEx(Vec<u8>),
}

impl WireMessage {
    const fn one(status: u8) -> Self {
        Self::Short {
            bytes: [status, 0, 0],
            len: 1,
        }
    }

    const fn two(status: u8, byte2: u8) -> Self {
        Self::Short {
            bytes: [status, byte2 & DATA_MASK, 0],
            len: 2,
        }
    }

    const fn three(status: u8, byte2: u8, byte3: u8) -> Self {
        Self::Short {
            bytes: [status, byte2 & DATA_MASK, byte3 & DATA_MASK],
            len: 3,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Short { bytes, len } => &bytes[..usize::from(*len)],
            Self::SysEx(bytes) => bytes,
        }
    }
}

impl AsRef<[u8]> for WireMessage {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

const fn channel_status(status: u8, channel: u8) -> u8 {
    status | (channel & CHANNEL_MASK)
}

#[must_use]
pub const fn note_off(channel: u8, note: u8, velocity: u8) -> WireMessage {
    WireMessage::three(channel_status(STATUS_NOTE_OFF, channel), note, velocity)
}

#[must_use]
pub const fn note_on(channel: u8, note: u8, velocity: u8) -> WireMessage {
    WireMessage::three(channel_status(STATUS_NOTE_ON, channel), note, velocity)
}

#[must_use]
pub const fn polyphonic_aftertouch(channel: u8, note: u8, pressure: u8) -> WireMessage {
    WireMessage::three(
        channel_status(STATUS_POLYPHONIC_AFTERTOUCH, channel),
        note,
        pressure,
    )
}

#[must_use]
pub const fn control_change(channel: u8, controller: u8, value: u8) -> WireMessage {
    WireMessage::three(
        channel_status(STATUS_CONTROL_CHANGE, channel),
        controller,
        value,
    )
}

#[must_use]
pub const fn program_change(channel: u8, program: u8) -> WireMessage {
    WireMessage::two(channel_status(STATUS_PROGRAM_CHANGE, channel), program)
}

#[must_use]
pub const fn channel_aftertouch(channel: u8, pressure: u8) -> WireMessage {
    WireMessage::two(channel_status(STATUS_CHANNEL_AFTERTOUCH, channel), pressure)
}

/// Pitch wheel with an unsigned 14-bit value, centered at 8192.
#[must_use]
pub const fn pitch_wheel(channel: u8, value: u16) -> WireMessage {
    let [lsb, msb] = u14_to_data_bytes(value);
    WireMessage::three(channel_status(STATUS_PITCH_WHEEL, channel), lsb, msb)
}

/// System exclusive message bytes including the leading `0xF0` and trailing `0xF7`.
///
/// The bytes are not validated.
#[must_use]
pub fn system_exclusive(data: impl Into<Vec<u8>>) -> WireMessage {
    WireMessage::SysEx(data.into())
}

#[must_use]
pub const fn time_code_quarter_frame(value: u8) -> WireMessage {
    WireMessage::two(STATUS_TIME_CODE_QUARTER_FRAME, value)
}

#[must_use]
pub const fn song_position_pointer(position: u16) -> WireMessage {
    let [lsb, msb] = u14_to_data_bytes(position);
    WireMessage::three(STATUS_SONG_POSITION_POINTER, lsb, msb)
}

#[must_use]
pub const fn song_select(song: u8) -> WireMessage {
    WireMessage::two(STATUS_SONG_SELECT, song)
}

#[must_use]
pub const fn tune_request() -> WireMessage {
    WireMessage::one(STATUS_TUNE_REQUEST)
}

#[must_use]
pub const fn timing_clock() -> WireMessage {
    WireMessage::one(STATUS_TIMING_CLOCK)
}

#[must_use]
pub const fn start() -> WireMessage {
    WireMessage::one(STATUS_START)
}

#[must_use]
pub const fn continue_() -> WireMessage {
    WireMessage::one(STATUS_CONTINUE)
}

#[must_use]
pub const fn stop() -> WireMessage {
    WireMessage::one(STATUS_STOP)
}

#[must_use]
pub const fn active_sensing() -> WireMessage {
    WireMessage::one(STATUS_ACTIVE_SENSING)
}

#[must_use]
pub const fn reset() -> WireMessage {
    WireMessage::one(STATUS_RESET)
}

/// Encode an event into its wire format.
#[must_use]
pub fn encode(event: &MidiEvent) -> WireMessage {
    match *event {
        MidiEvent::NoteOff {
            channel,
            note,
            velocity,
        } => note_off(channel, note, velocity),
        MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } => note_on(channel, note, velocity),
        MidiEvent::PolyphonicAftertouch {
            channel,
            note,
            pressure,
        } => polyphonic_aftertouch(channel, note, pressure),
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        } => control_change(channel, controller, value),
        MidiEvent::ProgramChange { channel, program } => program_change(channel, program),
        MidiEvent::ChannelAftertouch { channel, pressure } => {
            channel_aftertouch(channel, pressure)
        }
        MidiEvent::PitchWheel { channel, value } => pitch_wheel(channel, value),
        MidiEvent::SystemExclusive { ref data } => system_exclusive(data.as_slice()),
        MidiEvent::TimeCodeQuarterFrame { value } => time_code_quarter_frame(value),
        MidiEvent::SongPositionPointer { position } => song_position_pointer(position),
        MidiEvent::SongSelect { song } => song_select(song),
        MidiEvent::TuneRequest => tune_request(),
        MidiEvent::TimingClock => timing_clock(),
        MidiEvent::Start => start(),
        MidiEvent::Continue => continue_(),
        MidiEvent::Stop => stop(),
        MidiEvent::ActiveSensing => active_sensing(),
        MidiEvent::Reset => reset(),
    }
}
