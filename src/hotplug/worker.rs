// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

use std::{io, sync::Arc, thread::JoinHandle};

use super::HotplugContext;
use crate::{
    midi::MidiDecoder,
    notify::Notification,
    registry::{DeviceId, EndpointKind, WorkerToken},
    transport::BoxedInputEndpoint,
};

/// Why a worker thread terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    /// Cancelled by the reconciler or on shutdown.
    Cancelled,

    /// The endpoint failed permanently.
    Failed,
}

/// Dedicated thread for each input endpoint.
///
/// Pulls bytes from the endpoint, decodes them, and emits a
/// notification for each decoded event.
#[derive(Debug)]
pub(crate) struct InputWorker {
    device_id: DeviceId,
    token: WorkerToken,
    os_thread: JoinHandle<Termination>,
}

fn thread_fn(
    context: &HotplugContext,
    kind: EndpointKind,
    device_id: &DeviceId,
    mut input: BoxedInputEndpoint,
    token: &WorkerToken,
) -> Termination {
    let config = context.config();
    let mut decoder = MidiDecoder::new().with_max_sysex_len(config.max_sysex_len);
    // At least 1 byte
    let mut read_buf = vec![0; config.read_buffer_size.max(1)];
    while !token.is_cancelled() && !context.is_stopping() {
        let bytes_read = match input.read(&mut read_buf) {
            Ok(bytes_read) => bytes_read,
            Err(err) => {
                log::warn!("Failed to read from {kind} {device_id}: {err}");
                // Close the endpoint before detaching
                drop(input);
                context.detach_failed_input(kind, device_id, token);
                return Termination::Failed;
            }
        };
        if bytes_read == 0 {
            std::thread::sleep(config.idle_backoff);
            continue;
        }
        debug_assert!(bytes_read <= read_buf.len());
        let received = &read_buf[..bytes_read];
        log::trace!("Received {bytes_read} byte(s) from {device_id}: {received:02x?}");
        for event in decoder.decode(received) {
            Notification::midi_event(device_id, &event).emit(context.sink());
        }
    }
    Termination::Cancelled
}

impl InputWorker {
    pub(crate) fn spawn(
        context: Arc<HotplugContext>,
        kind: EndpointKind,
        device_id: DeviceId,
        input: BoxedInputEndpoint,
        token: WorkerToken,
    ) -> io::Result<Self> {
        let os_thread = std::thread::Builder::new()
            .name(format!("midiplug-in {device_id}"))
            .spawn({
                let device_id = device_id.clone();
                let token = token.clone();
                move || {
                    log::debug!("Entering input thread of {kind} {device_id}");
                    let termination = thread_fn(&context, kind, &device_id, input, &token);
                    log::debug!("Exiting input thread of {kind} {device_id}: {termination:?}");
                    termination
                }
            })?;
        Ok(Self {
            device_id,
            token,
            os_thread,
        })
    }

    #[must_use]
    pub(crate) const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    #[must_use]
    pub(crate) fn is_finished(&self) -> bool {
        self.os_thread.is_finished()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn join(self) -> anyhow::Result<Termination> {
        let Self {
            device_id,
            token: _,
            os_thread,
        } = self;
        os_thread
            .join()
            .map_err(|err| anyhow::anyhow!("Input thread of {device_id} panicked: {err:?}"))
    }
}
