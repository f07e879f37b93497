// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Transport abstraction
//!
//! The reconciler only talks to the operating system through these
//! traits. A native implementation for ALSA is available with the
//! `alsa` feature.

use std::{borrow::Cow, io, sync::Arc};

use thiserror::Error;

use crate::{
    midi::MidiEvent,
    registry::{DeviceFamily, DeviceId, DeviceName, Direction, EndpointAddress, EndpointKind},
};

#[cfg(test)]
pub(crate) mod mock;

mod pending;
pub use self::pending::PendingBytes;

/// Failure of an open endpoint
///
/// All errors are considered permanent, i.e. the endpoint is
/// detached after the first error.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("disconnected")]
    Disconnected,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{msg}")]
    Transport { msg: Cow<'static, str> },
}

impl EndpointError {
    #[must_use]
    pub fn transport(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Transport { msg: msg.into() }
    }
}

/// Failed to enumerate all endpoints of a device family
#[derive(Debug, Error)]
#[error("failed to enumerate {family} endpoints: {msg}")]
pub struct EnumerationError {
    pub family: DeviceFamily,
    pub msg: Cow<'static, str>,
}

/// An endpoint that is visible during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    pub id: DeviceId,
    pub name: DeviceName,
    pub direction: Direction,
    pub address: EndpointAddress,
}

impl DiscoveredEndpoint {
    #[must_use]
    pub fn new(address: EndpointAddress, direction: Direction, name: impl Into<DeviceName>) -> Self {
        Self {
            id: address.device_id(),
            name: name.into(),
            direction,
            address,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EndpointKind {
        EndpointKind::new(self.address.family(), self.direction)
    }
}

/// Source of received bytes
///
/// Owned exclusively by a single worker thread.
pub trait InputEndpoint {
    /// Read all pending bytes without blocking.
    ///
    /// Returns 0 if no bytes are pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError>;
}

/// Sink for outbound messages
///
/// Shared by all threads that send messages to the endpoint.
pub trait OutputEndpoint: Send + Sync {
    fn send(&self, event: &MidiEvent) -> Result<(), EndpointError>;
}

pub type BoxedInputEndpoint = Box<dyn InputEndpoint + Send>;

pub type SharedOutputEndpoint = Arc<dyn OutputEndpoint>;

/// Enumerates and opens endpoints.
pub trait Transport: Send + Sync {
    /// List all currently visible endpoints of a family.
    fn enumerate(&self, family: DeviceFamily) -> Result<Vec<DiscoveredEndpoint>, EnumerationError>;

    fn open_input(&self, endpoint: &DiscoveredEndpoint) -> Result<BoxedInputEndpoint, EndpointError>;

    fn open_output(
        &self,
        endpoint: &DiscoveredEndpoint,
    ) -> Result<SharedOutputEndpoint, EndpointError>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn enumerate(&self, family: DeviceFamily) -> Result<Vec<DiscoveredEndpoint>, EnumerationError> {
        T::enumerate(self, family)
    }

    fn open_input(&self, endpoint: &DiscoveredEndpoint) -> Result<BoxedInputEndpoint, EndpointError> {
        T::open_input(self, endpoint)
    }

    fn open_output(
        &self,
        endpoint: &DiscoveredEndpoint,
    ) -> Result<SharedOutputEndpoint, EndpointError> {
        T::open_output(self, endpoint)
    }
}
