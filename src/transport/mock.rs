// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! In-memory transport and sink for tests

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use super::{
    BoxedInputEndpoint, DiscoveredEndpoint, EndpointError, EnumerationError, InputEndpoint,
    OutputEndpoint, PendingBytes, SharedOutputEndpoint, Transport,
};
use crate::{
    midi::MidiEvent,
    notify::EventSink,
    registry::{DeviceFamily, DeviceId, Direction, EndpointAddress},
};

pub(crate) fn hardware_endpoint(card: i32, direction: Direction, name: &str) -> DiscoveredEndpoint {
    DiscoveredEndpoint::new(
        EndpointAddress::Hardware {
            card,
            device: 0,
            subdevice: 0,
        },
        direction,
        name,
    )
}

pub(crate) fn virtual_endpoint(client: i32, direction: Direction, name: &str) -> DiscoveredEndpoint {
    DiscoveredEndpoint::new(
        EndpointAddress::Virtual { client, port: 0 },
        direction,
        name,
    )
}

#[derive(Debug, Default)]
struct MockState {
    visible: HashMap<DeviceFamily, Vec<DiscoveredEndpoint>>,
    failing_families: HashSet<DeviceFamily>,
    failing_opens: HashSet<DeviceId>,
    pending_input: HashMap<DeviceId, PendingBytes>,
    disconnected_inputs: HashSet<DeviceId>,
    failing_outputs: HashSet<DeviceId>,
    sent: Vec<(DeviceId, MidiEvent)>,
    open_count: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_visible(&self, family: DeviceFamily, endpoints: Vec<DiscoveredEndpoint>) {
        self.state().visible.insert(family, endpoints);
    }

    pub(crate) fn fail_enumeration(&self, family: DeviceFamily, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_families.insert(family);
        } else {
            state.failing_families.remove(&family);
        }
    }

    pub(crate) fn fail_open(&self, id: &DeviceId, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_opens.insert(id.clone());
        } else {
            state.failing_opens.remove(id);
        }
    }

    pub(crate) fn push_input(&self, id: &DeviceId, bytes: &[u8]) {
        self.state()
            .pending_input
            .entry(id.clone())
            .or_default()
            .push(bytes);
    }

    /// All subsequent reads from the input fail.
    pub(crate) fn disconnect_input(&self, id: &DeviceId) {
        self.state().disconnected_inputs.insert(id.clone());
    }

    pub(crate) fn fail_output(&self, id: &DeviceId) {
        self.state().failing_outputs.insert(id.clone());
    }

    pub(crate) fn sent(&self) -> Vec<(DeviceId, MidiEvent)> {
        self.state().sent.clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state().open_count
    }

    fn open(&self, endpoint: &DiscoveredEndpoint) -> Result<(), EndpointError> {
        let mut state = self.state();
        if state.failing_opens.contains(&endpoint.id) {
            return Err(EndpointError::transport("busy"));
        }
        state.open_count += 1;
        Ok(())
    }
}

impl Transport for MockTransport {
    fn enumerate(&self, family: DeviceFamily) -> Result<Vec<DiscoveredEndpoint>, EnumerationError> {
        let state = self.state();
        if state.failing_families.contains(&family) {
            return Err(EnumerationError {
                family,
                msg: "unavailable".into(),
            });
        }
        Ok(state.visible.get(&family).cloned().unwrap_or_default())
    }

    fn open_input(&self, endpoint: &DiscoveredEndpoint) -> Result<BoxedInputEndpoint, EndpointError> {
        self.open(endpoint)?;
        Ok(Box::new(MockInput {
            id: endpoint.id.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    fn open_output(
        &self,
        endpoint: &DiscoveredEndpoint,
    ) -> Result<SharedOutputEndpoint, EndpointError> {
        self.open(endpoint)?;
        Ok(Arc::new(MockOutput {
            id: endpoint.id.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct MockInput {
    id: DeviceId,
    state: Arc<Mutex<MockState>>,
}

impl InputEndpoint for MockInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        let mut state = self.state.lock().unwrap();
        if state.disconnected_inputs.contains(&self.id) {
            return Err(EndpointError::Disconnected);
        }
        let Some(pending) = state.pending_input.get_mut(&self.id) else {
            return Ok(0);
        };
        Ok(pending.read_into(buf))
    }
}

#[derive(Debug)]
struct MockOutput {
    id: DeviceId,
    state: Arc<Mutex<MockState>>,
}

impl OutputEndpoint for MockOutput {
    fn send(&self, event: &MidiEvent) -> Result<(), EndpointError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_outputs.contains(&self.id) {
            return Err(EndpointError::Disconnected);
        }
        state.sent.push((self.id.clone(), event.clone()));
        Ok(())
    }
}

/// Records all notifications as `(name, payload)` pairs.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSink {
    received: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSink {
    pub(crate) fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.received.lock().unwrap())
    }

    /// Wait until the received notifications satisfy the predicate.
    ///
    /// Returns `false` on timeout.
    pub(crate) fn wait_until(&self, mut predicate: impl FnMut(&[(String, String)]) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if predicate(&self.received.lock().unwrap()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, name: &str, payload: &str) {
        self.received
            .lock()
            .unwrap()
            .push((name.to_owned(), payload.to_owned()));
    }
}

pub(crate) fn notification(name: &str, payload: &str) -> (String, String) {
    (name.to_owned(), payload.to_owned())
}
