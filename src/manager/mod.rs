// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Owning facade of the crate
//!
//! A [`MidiDeviceManager`] owns the registry, the transport, and the
//! notification sink. It runs the hot-plug reconciler on a dedicated
//! thread and provides the outbound command surface.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
};

use strum::IntoEnumIterator as _;
use thiserror::Error;

use crate::{
    config::Config,
    hotplug::{HotplugContext, HotplugReconciler},
    midi::MidiEvent,
    notify::EventSink,
    registry::{DeviceFamily, DeviceId, DeviceName, DeviceRegistry, Direction, EndpointKind},
    transport::{EndpointError, Transport},
};


#[derive(Debug, Error)]
pub enum SendError {
    #[error("device {device_id} not found")]
    NotFound { device_id: DeviceId },
    #[error("failed to send to device {device_id}: {source}")]
    Endpoint {
        device_id: DeviceId,
        #[source]
        source: EndpointError,
    },
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("already running")]
    AlreadyRunning,
    #[error(transparent)]
    Spawn(#[from] io::Error),
}

fn lock(reconciler: &Mutex<HotplugReconciler>) -> MutexGuard<'_, HotplugReconciler> {
    reconciler.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_reconciler(reconciler: &Mutex<HotplugReconciler>) {
    let context = Arc::clone(lock(reconciler).context());
    let poll_interval = context.config().poll_interval;
    while !context.is_stopping() {
        lock(reconciler).tick();
        // Woken up early on shutdown
        std::thread::park_timeout(poll_interval);
    }
}

/// Tracks MIDI devices and exchanges messages with them.
///
/// Dropping a running manager shuts it down.
#[derive(Debug)]
pub struct MidiDeviceManager {
    context: Arc<HotplugContext>,
    reconciler: Arc<Mutex<HotplugReconciler>>,
    reconciler_thread: Option<JoinHandle<()>>,
}

impl MidiDeviceManager {
    #[must_use]
    pub fn new(
        transport: impl Transport + 'static,
        sink: impl EventSink + 'static,
        config: Config,
    ) -> Self {
        let context = Arc::new(HotplugContext::new(transport, sink, config));
        let reconciler = HotplugReconciler::new(Arc::clone(&context));
        Self {
            context,
            reconciler: Arc::new(Mutex::new(reconciler)),
            reconciler_thread: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        self.context.config()
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        self.context.registry()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.reconciler_thread.is_some()
    }

    /// Spawn the reconciler thread.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }
        self.context.set_stopping(false);
        let reconciler = Arc::clone(&self.reconciler);
        let join_handle = std::thread::Builder::new()
            .name("midiplug-reconciler".to_owned())
            .spawn(move || {
                log::info!("Entering reconciler thread");
                run_reconciler(&reconciler);
                log::info!("Exiting reconciler thread");
            })?;
        log::debug!("Spawned thread: {join_handle:?}");
        self.reconciler_thread = Some(join_handle);
        Ok(())
    }

    /// Perform a single reconciliation pass on the calling thread.
    ///
    /// Useful for driving the manager without a reconciler thread.
    pub fn poll_once(&self) {
        lock(&self.reconciler).tick();
    }

    /// Stop the reconciler and all input workers.
    ///
    /// Joins all threads before returning. All endpoints are closed and
    /// the registry is cleared, but cached device names are retained.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        self.context.set_stopping(true);
        let joined = if let Some(join_handle) = self.reconciler_thread.take() {
            log::debug!("Joining thread: {join_handle:?}");
            join_handle.thread().unpark();
            join_handle
                .join()
                .map_err(|err| anyhow::anyhow!("Reconciler thread panicked: {err:?}"))
        } else {
            Ok(())
        };
        let shut_down = lock(&self.reconciler).shutdown();
        joined.and(shut_down)
    }

    /// Name of a device as cached on its first discovery.
    #[must_use]
    pub fn device_name(&self, device_id: &DeviceId) -> Option<DeviceName> {
        self.context.registry().name_for(device_id)
    }

    /// Send an event to all output endpoints with the given id.
    ///
    /// The same id could be registered for outputs of multiple families.
    /// The event is sent to all of them. Endpoints that fail are detached.
    pub fn send(&self, device_id: &DeviceId, event: &MidiEvent) -> Result<(), SendError> {
        let registry = self.context.registry();
        let mut found = false;
        let mut first_err = None;
        for family in DeviceFamily::iter() {
            let kind = EndpointKind::new(family, Direction::Output);
            let Some(output) = registry.output(kind, device_id) else {
                continue;
            };
            found = true;
            log::trace!("Sending {event:?} to {kind} {device_id}");
            if let Err(err) = output.send(event) {
                log::warn!("Failed to send to {kind} {device_id}: {err}");
                self.context.detach_failed_output(kind, device_id, &output);
                first_err.get_or_insert(err);
            }
        }
        if !found {
            return Err(SendError::NotFound {
                device_id: device_id.clone(),
            });
        }
        if let Some(source) = first_err {
            return Err(SendError::Endpoint {
                device_id: device_id.clone(),
                source,
            });
        }
        Ok(())
    }

    pub fn send_note_off(
        &self,
        device_id: &DeviceId,
        channel: u8,
        note: u8,
        velocity: u8,
    ) -> Result<(), SendError> {
        self.send(
            device_id,
            &MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            },
        )
    }

    pub fn send_note_on(
        &self,
        device_id: &DeviceId,
        channel: u8,
        note: u8,
        velocity: u8,
    ) -> Result<(), SendError> {
        self.send(
            device_id,
            &MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            },
        )
    }

    pub fn send_polyphonic_aftertouch(
        &self,
        device_id: &DeviceId,
        channel: u8,
        note: u8,
        pressure: u8,
    ) -> Result<(), SendError> {
        self.send(
            device_id,
            &MidiEvent::PolyphonicAftertouch {
                channel,
                note,
                pressure,
            },
        )
    }

    pub fn send_control_change(
        &self,
        device_id: &DeviceId,
        channel: u8,
        controller: u8,
        value: u8,
    ) -> Result<(), SendError> {
        self.send(
            device_id,
            &MidiEvent::ControlChange {
                channel,
                controller,
                value,
            },
        )
    }

    pub fn send_program_change(
        &self,
        device_id: &DeviceId,
        channel: u8,
        program: u8,
    ) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::ProgramChange { channel, program })
    }

    pub fn send_channel_aftertouch(
        &self,
        device_id: &DeviceId,
        channel: u8,
        pressure: u8,
    ) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::ChannelAftertouch { channel, pressure })
    }

    /// Send a pitch wheel change with an unsigned 14-bit value, centered at 8192.
    pub fn send_pitch_wheel(
        &self,
        device_id: &DeviceId,
        channel: u8,
        value: u16,
    ) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::PitchWheel { channel, value })
    }

    /// Send a system exclusive message including the leading `0xF0` and trailing `0xF7`.
    pub fn send_system_exclusive(
        &self,
        device_id: &DeviceId,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::SystemExclusive { data: data.into() })
    }

    pub fn send_time_code_quarter_frame(
        &self,
        device_id: &DeviceId,
        value: u8,
    ) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::TimeCodeQuarterFrame { value })
    }

    pub fn send_song_position_pointer(
        &self,
        device_id: &DeviceId,
        position: u16,
    ) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::SongPositionPointer { position })
    }

    pub fn send_song_select(&self, device_id: &DeviceId, song: u8) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::SongSelect { song })
    }

    pub fn send_tune_request(&self, device_id: &DeviceId) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::TuneRequest)
    }

    pub fn send_timing_clock(&self, device_id: &DeviceId) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::TimingClock)
    }

    pub fn send_start(&self, device_id: &DeviceId) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::Start)
    }

    pub fn send_continue(&self, device_id: &DeviceId) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::Continue)
    }

    pub fn send_stop(&self, device_id: &DeviceId) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::Stop)
    }

    pub fn send_active_sensing(&self, device_id: &DeviceId) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::ActiveSensing)
    }

    pub fn send_reset(&self, device_id: &DeviceId) -> Result<(), SendError> {
        self.send(device_id, &MidiEvent::Reset)
    }
}

impl Drop for MidiDeviceManager {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("Failed to shut down: {err}");
        }
    }
}
