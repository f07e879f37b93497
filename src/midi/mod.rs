// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! MIDI 1.0 messages and their wire format
//!
//! [`MidiEvent`] is the structured representation shared by both directions:
//! the [`decoder`] turns received bytes into events and the [`encoder`]
//! turns outbound events into bytes.

use strum::EnumDiscriminants;

pub mod decoder;
pub use self::decoder::{DecoderState, MidiDecoder};

pub mod encoder;
pub use self::encoder::{encode, WireMessage};

#[cfg(feature = "alsa")]
pub mod alsa;

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_POLYPHONIC_AFTERTOUCH: u8 = 0xa0;
pub const STATUS_CONTROL_CHANGE: u8 = 0xb0;
pub const STATUS_PROGRAM_CHANGE: u8 = 0xc0;
pub const STATUS_CHANNEL_AFTERTOUCH: u8 = 0xd0;
pub const STATUS_PITCH_WHEEL: u8 = 0xe0;

pub const STATUS_SYSTEM_EXCLUSIVE: u8 = 0xf0;
pub const STATUS_TIME_CODE_QUARTER_FRAME: u8 = 0xf1;
pub const STATUS_SONG_POSITION_POINTER: u8 = 0xf2;
pub const STATUS_SONG_SELECT: u8 = 0xf3;
pub const STATUS_TUNE_REQUEST: u8 = 0xf6;
pub const STATUS_END_OF_EXCLUSIVE: u8 = 0xf7;

pub const STATUS_TIMING_CLOCK: u8 = 0xf8;
pub const STATUS_START: u8 = 0xfa;
pub const STATUS_CONTINUE: u8 = 0xfb;
pub const STATUS_STOP: u8 = 0xfc;
pub const STATUS_ACTIVE_SENSING: u8 = 0xfe;
pub const STATUS_RESET: u8 = 0xff;

/// Mask for the 4-bit channel number in the low nibble of a status byte.
pub const CHANNEL_MASK: u8 = 0x0f;

/// Mask for the 7 bits of a data byte.
pub const DATA_MASK: u8 = 0x7f;

/// Largest 14-bit value, e.g. of the pitch wheel or the song position.
pub const MAX_U14: u16 = 0x3fff;

/// Wire value of a centered pitch wheel.
pub const PITCH_WHEEL_CENTER: u16 = 0x2000;

/// A decoded or outbound MIDI message.
///
/// Channel and data fields hold the values as they appear on the wire,
/// i.e. channels are 0-based and 14-bit values are unsigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumDiscriminants)]
#[strum_discriminants(name(MidiEventKind), derive(Hash, strum::EnumIter))]
pub enum MidiEvent {
    NoteOff {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    PolyphonicAftertouch {
        channel: u8,
        note: u8,
        pressure: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    ChannelAftertouch {
        channel: u8,
        pressure: u8,
    },
    /// Pitch wheel position in the interval [0, 16383] with the
    /// center at [`PITCH_WHEEL_CENTER`].
    PitchWheel {
        channel: u8,
        value: u16,
    },
    /// The complete message including the leading `0xF0` and the
    /// trailing `0xF7`.
    SystemExclusive {
        data: Vec<u8>,
    },
    TimeCodeQuarterFrame {
        value: u8,
    },
    SongPositionPointer {
        position: u16,
    },
    SongSelect {
        song: u8,
    },
    TuneRequest,
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    Reset,
}

impl MidiEvent {
    #[must_use]
    pub fn kind(&self) -> MidiEventKind {
        self.into()
    }

    /// The channel of channel voice messages.
    ///
    /// Returns `None` for system messages.
    #[must_use]
    pub const fn channel(&self) -> Option<u8> {
        match self {
            Self::NoteOff { channel, .. }
            | Self::NoteOn { channel, .. }
            | Self::PolyphonicAftertouch { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelAftertouch { channel, .. }
            | Self::PitchWheel { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Single-byte messages that may be interleaved anywhere in the stream.
    #[must_use]
    pub const fn is_real_time(&self) -> bool {
        matches!(
            self,
            Self::TimingClock
                | Self::Start
                | Self::Continue
                | Self::Stop
                | Self::ActiveSensing
                | Self::Reset
        )
    }
}

impl MidiEventKind {
    /// Name of the notification that is emitted for received events of this kind.
    #[must_use]
    pub const fn notification_name(self) -> &'static str {
        match self {
            Self::NoteOff => "OnMidiNoteOff",
            Self::NoteOn => "OnMidiNoteOn",
            Self::PolyphonicAftertouch => "OnMidiPolyphonicAftertouch",
            Self::ControlChange => "OnMidiControlChange",
            Self::ProgramChange => "OnMidiProgramChange",
            Self::ChannelAftertouch => "OnMidiChannelAftertouch",
            Self::PitchWheel => "OnMidiPitchWheel",
            Self::SystemExclusive => "OnMidiSystemExclusive",
            Self::TimeCodeQuarterFrame => "OnMidiTimeCodeQuarterFrame",
            Self::SongPositionPointer => "OnMidiSongPositionPointer",
            Self::SongSelect => "OnMidiSongSelect",
            Self::TuneRequest => "OnMidiTuneRequest",
            Self::TimingClock => "OnMidiTimingClock",
            Self::Start => "OnMidiStart",
            Self::Continue => "OnMidiContinue",
            Self::Stop => "OnMidiStop",
            Self::ActiveSensing => "OnMidiActiveSensing",
            Self::Reset => "OnMidiReset",
        }
    }
}

/// Combine two 7-bit data bytes (LSB first) into a 14-bit value.
#[must_use]
pub const fn u14_from_data_bytes(lsb: u8, msb: u8) -> u16 {
    (lsb & DATA_MASK) as u16 | ((msb & DATA_MASK) as u16) << 7
}

/// Split a 14-bit value into two 7-bit data bytes (LSB first).
///
/// Bits above the 14-bit range are discarded.
#[must_use]
pub const fn u14_to_data_bytes(value: u16) -> [u8; 2] {
    [(value & 0x7f) as u8, ((value >> 7) & 0x7f) as u8]
}

/// Signed pitch wheel offset around the center, in the interval [-8192, 8191].
///
/// This is the representation used by sequencer event containers.
#[must_use]
#[expect(clippy::cast_possible_wrap)]
pub const fn pitch_wheel_to_offset(value: u16) -> i16 {
    (value & MAX_U14) as i16 - PITCH_WHEEL_CENTER as i16
}

/// Inverse of [`pitch_wheel_to_offset()`].
///
/// Out-of-range offsets are clamped.
#[must_use]
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn pitch_wheel_from_offset(offset: i32) -> u16 {
    (offset + i32::from(PITCH_WHEEL_CENTER)).clamp(0, i32::from(MAX_U14)) as u16
}
