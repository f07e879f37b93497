// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Registry of attached endpoints
//!
//! Endpoints are tracked in 4 independent mappings, one for each
//! combination of [`DeviceFamily`] and [`Direction`]. The same
//! [`DeviceId`] may occur in both directions of a family, e.g. for
//! a hardware port that supports both input and output.

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use derive_more::{Deref, Display, From};
use enum_as_inner::EnumAsInner;
use strum::EnumIter;

use crate::transport::OutputEndpoint;


/// Identifier of a device endpoint
///
/// Opaque, family-specific string:
///
/// - `hw:<card>-<device>-<subdevice>` for [`DeviceFamily::Hardware`]
/// - `seq:<client>-<port>` for [`DeviceFamily::Virtual`]
///
/// The value is derived from the [`EndpointAddress`] and immutable after
/// initial discovery.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Deref)]
pub struct DeviceId(String);

impl DeviceId {
    #[must_use]
    pub fn hardware(card: i32, device: u32, subdevice: u32) -> Self {
        Self(format!("hw:{card}-{device}-{subdevice}"))
    }

    #[must_use]
    pub fn virtual_port(client: i32, port: i32) -> Self {
        Self(format!("seq:{client}-{port}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(from: &str) -> Self {
        Self(from.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(from: String) -> Self {
        Self(from)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Human-readable name of a device endpoint
///
/// Used as a label.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Display, From, Deref)]
pub struct DeviceName(String);

impl From<&str> for DeviceName {
    fn from(from: &str) -> Self {
        Self(from.to_owned())
    }
}

impl AsRef<str> for DeviceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum DeviceFamily {
    /// Ports of sound cards, i.e. ALSA rawmidi.
    #[display("hardware")]
    Hardware,

    /// Ports of software clients, i.e. ALSA sequencer.
    #[display("virtual")]
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Direction {
    #[display("input")]
    Input,

    #[display("output")]
    Output,
}

/// Identifies one of the registry's mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{family} {direction}")]
pub struct EndpointKind {
    pub family: DeviceFamily,
    pub direction: Direction,
}

impl EndpointKind {
    pub const HARDWARE_INPUT: Self = Self::new(DeviceFamily::Hardware, Direction::Input);
    pub const HARDWARE_OUTPUT: Self = Self::new(DeviceFamily::Hardware, Direction::Output);
    pub const VIRTUAL_INPUT: Self = Self::new(DeviceFamily::Virtual, Direction::Input);
    pub const VIRTUAL_OUTPUT: Self = Self::new(DeviceFamily::Virtual, Direction::Output);

    #[must_use]
    pub const fn new(family: DeviceFamily, direction: Direction) -> Self {
        Self { family, direction }
    }

    /// The kind with the same family and the opposite direction.
    #[must_use]
    pub const fn counterpart(self) -> Self {
        let direction = match self.direction {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        };
        Self::new(self.family, direction)
    }

    const fn index(self) -> usize {
        match (self.family, self.direction) {
            (DeviceFamily::Hardware, Direction::Input) => 0,
            (DeviceFamily::Hardware, Direction::Output) => 1,
            (DeviceFamily::Virtual, Direction::Input) => 2,
            (DeviceFamily::Virtual, Direction::Output) => 3,
        }
    }
}

/// Transport-level address of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointAddress {
    Hardware {
        card: i32,
        device: u32,
        subdevice: u32,
    },
    Virtual {
        client: i32,
        port: i32,
    },
}

impl EndpointAddress {
    #[must_use]
    pub const fn family(&self) -> DeviceFamily {
        match self {
            Self::Hardware { .. } => DeviceFamily::Hardware,
            Self::Virtual { .. } => DeviceFamily::Virtual,
        }
    }

    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        match *self {
            Self::Hardware {
                card,
                device,
                subdevice,
            } => DeviceId::hardware(card, device, subdevice),
            Self::Virtual { client, port } => DeviceId::virtual_port(client, port),
        }
    }
}

/// Cancellation token of an input worker
///
/// Clones share the same flag. Each worker owns a distinct token,
/// which also identifies the worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerToken(Arc<AtomicBool>);

impl WorkerToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to terminate.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Check if both tokens belong to the same worker.
    #[must_use]
    pub fn is_same_worker(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Handle of an attached endpoint
///
/// Input endpoints are owned exclusively by their worker thread,
/// the registry only holds the worker's token.
#[derive(Clone, EnumAsInner)]
pub enum EndpointHandle {
    Input(WorkerToken),
    Output(Arc<dyn OutputEndpoint>),
}

impl fmt::Debug for EndpointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(token) => f.debug_tuple("Input").field(token).finish(),
            Self::Output(_) => f.write_str("Output(..)"),
        }
    }
}

type EndpointMap = HashMap<DeviceId, EndpointHandle>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The maps stay consistent even if a thread panicked while holding the lock
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Authoritative mapping of attached endpoints
///
/// Each mapping and the name cache are guarded by a separate lock.
/// Operations never hold more than one lock at a time.
#[derive(Default)]
pub struct DeviceRegistry {
    endpoints: [Mutex<EndpointMap>; 4],
    names: Mutex<HashMap<DeviceId, DeviceName>>,
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry").finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn endpoints(&self, kind: EndpointKind) -> MutexGuard<'_, EndpointMap> {
        lock(&self.endpoints[kind.index()])
    }

    #[must_use]
    pub fn lookup(&self, kind: EndpointKind, id: &DeviceId) -> Option<EndpointHandle> {
        self.endpoints(kind).get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, kind: EndpointKind, id: &DeviceId) -> bool {
        self.endpoints(kind).contains_key(id)
    }

    /// Shared output endpoint, if attached.
    #[must_use]
    pub fn output(&self, kind: EndpointKind, id: &DeviceId) -> Option<Arc<dyn OutputEndpoint>> {
        debug_assert_eq!(kind.direction, Direction::Output);
        self.lookup(kind, id)
            .and_then(|handle| handle.into_output().ok())
    }

    /// Register a new endpoint.
    ///
    /// Returns `false` and leaves the existing entry untouched if the
    /// id is already registered.
    pub fn insert(&self, kind: EndpointKind, id: DeviceId, handle: EndpointHandle) -> bool {
        debug_assert_eq!(
            kind.direction == Direction::Input,
            handle.is_input(),
            "direction mismatch"
        );
        match self.endpoints(kind).entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
                true
            }
        }
    }

    pub fn remove(&self, kind: EndpointKind, id: &DeviceId) -> Option<EndpointHandle> {
        self.endpoints(kind).remove(id)
    }

    /// Remove an input entry on behalf of its worker.
    ///
    /// The entry is only removed if it is still owned by the worker
    /// with the given token. Returns `true` if the entry has been removed.
    pub fn remove_input_of_worker(
        &self,
        kind: EndpointKind,
        id: &DeviceId,
        token: &WorkerToken,
    ) -> bool {
        debug_assert_eq!(kind.direction, Direction::Input);
        let mut endpoints = self.endpoints(kind);
        let owned_by_worker = endpoints
            .get(id)
            .and_then(EndpointHandle::as_input)
            .is_some_and(|registered| registered.is_same_worker(token));
        if owned_by_worker {
            endpoints.remove(id);
        }
        owned_by_worker
    }

    /// Remove an output entry if it still refers to the given endpoint.
    ///
    /// Returns `true` if the entry has been removed.
    pub fn remove_output(
        &self,
        kind: EndpointKind,
        id: &DeviceId,
        endpoint: &Arc<dyn OutputEndpoint>,
    ) -> bool {
        debug_assert_eq!(kind.direction, Direction::Output);
        let mut endpoints = self.endpoints(kind);
        let is_same_endpoint = endpoints
            .get(id)
            .and_then(EndpointHandle::as_output)
            .is_some_and(|registered| {
                // Only compare the data pointers, not the vtables
                Arc::as_ptr(registered).cast::<()>() == Arc::as_ptr(endpoint).cast::<()>()
            });
        if is_same_endpoint {
            endpoints.remove(id);
        }
        is_same_endpoint
    }

    /// Snapshot of all registered ids of a mapping.
    #[must_use]
    pub fn device_ids(&self, kind: EndpointKind) -> Vec<DeviceId> {
        self.endpoints(kind).keys().cloned().collect()
    }

    /// Remove all entries of a mapping.
    pub fn drain(&self, kind: EndpointKind) -> Vec<(DeviceId, EndpointHandle)> {
        self.endpoints(kind).drain().collect()
    }

    #[must_use]
    pub fn name_for(&self, id: &DeviceId) -> Option<DeviceName> {
        lock(&self.names).get(id).cloned()
    }

    /// Cache the name of a device.
    ///
    /// Only the first name is retained, subsequent invocations for the
    /// same id are ignored. Returns `true` if the name has been cached.
    pub fn cache_name(&self, id: &DeviceId, name: DeviceName) -> bool {
        let mut names = lock(&self.names);
        if names.contains_key(id) {
            return false;
        }
        names.insert(id.clone(), name);
        true
    }
}
