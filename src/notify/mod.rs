// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Named notifications with a textual payload
//!
//! Every received event and every attach/detach transition is reported
//! to an [`EventSink`] as a notification name and a comma-separated payload
//! that starts with the device id.

use std::fmt::Write as _;

use crate::{
    midi::MidiEvent,
    registry::{DeviceId, Direction},
};

pub const INPUT_DEVICE_ATTACHED: &str = "OnMidiInputDeviceAttached";
pub const INPUT_DEVICE_DETACHED: &str = "OnMidiInputDeviceDetached";
pub const OUTPUT_DEVICE_ATTACHED: &str = "OnMidiOutputDeviceAttached";
pub const OUTPUT_DEVICE_DETACHED: &str = "OnMidiOutputDeviceDetached";

/// Receiver of notifications
///
/// Invoked concurrently from the reconciler and all worker threads.
pub trait EventSink: Send + Sync {
    fn notify(&self, name: &str, payload: &str);
}

impl<F> EventSink for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn notify(&self, name: &str, payload: &str) {
        self(name, payload);
    }
}

/// Logs all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn notify(&self, name: &str, payload: &str) {
        log::info!("{name}: {payload}");
    }
}

/// Attach or detach transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Attached,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub name: &'static str,
    pub payload: String,
}

impl Notification {
    #[must_use]
    pub const fn lifecycle_name(direction: Direction, lifecycle: Lifecycle) -> &'static str {
        match (direction, lifecycle) {
            (Direction::Input, Lifecycle::Attached) => INPUT_DEVICE_ATTACHED,
            (Direction::Input, Lifecycle::Detached) => INPUT_DEVICE_DETACHED,
            (Direction::Output, Lifecycle::Attached) => OUTPUT_DEVICE_ATTACHED,
            (Direction::Output, Lifecycle::Detached) => OUTPUT_DEVICE_DETACHED,
        }
    }

    #[must_use]
    pub fn lifecycle(device_id: &DeviceId, direction: Direction, lifecycle: Lifecycle) -> Self {
        Self {
            name: Self::lifecycle_name(direction, lifecycle),
            payload: device_id.to_string(),
        }
    }

    /// Notification for a received event.
    #[must_use]
    pub fn midi_event(device_id: &DeviceId, event: &MidiEvent) -> Self {
        Self {
            name: event.kind().notification_name(),
            payload: midi_event_payload(device_id, event),
        }
    }

    pub fn emit(&self, sink: &(impl EventSink + ?Sized)) {
        sink.notify(self.name, &self.payload);
    }
}

fn midi_event_payload(device_id: &DeviceId, event: &MidiEvent) -> String {
    let mut payload = device_id.to_string();
    let res = match *event {
        MidiEvent::NoteOff {
            channel,
            note,
            velocity,
        }
        | MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } => write!(payload, ",{channel},{note},{velocity}"),
        MidiEvent::PolyphonicAftertouch {
            channel,
            note,
            pressure,
        } => write!(payload, ",{channel},{note},{pressure}"),
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        } => write!(payload, ",{channel},{controller},{value}"),
        MidiEvent::ProgramChange {
            channel,
            program: value,
        }
        | MidiEvent::ChannelAftertouch {
            channel,
            pressure: value,
        } => write!(payload, ",{channel},{value}"),
        MidiEvent::PitchWheel { channel, value } => write!(payload, ",{channel},{value}"),
        MidiEvent::SongPositionPointer { position } => write!(payload, ",{position}"),
        MidiEvent::SongSelect { song: value } | MidiEvent::TimeCodeQuarterFrame { value } => {
            write!(payload, ",{value}")
        }
        MidiEvent::SystemExclusive { ref data } => {
            payload.push_str(",0,");
            data.iter().try_for_each(|byte| write!(payload, "{byte},"))
        }
        MidiEvent::TuneRequest
        | MidiEvent::TimingClock
        | MidiEvent::Start
        | MidiEvent::Continue
        | MidiEvent::Stop
        | MidiEvent::ActiveSensing
        | MidiEvent::Reset => Ok(()),
    };
    // Writing into a String never fails
    debug_assert!(res.is_ok());
    payload
}
