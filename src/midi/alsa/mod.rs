// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

//! Native transport for Linux
//!
//! Hardware ports are accessed through the raw MIDI interface of the
//! sound cards. Ports of software clients are accessed through the
//! sequencer.

use std::{ffi::CString, sync::Arc};

use crate::{
    config::Config,
    registry::DeviceFamily,
    transport::{
        BoxedInputEndpoint, DiscoveredEndpoint, EndpointError, EnumerationError,
        SharedOutputEndpoint, Transport,
    },
};

mod hardware;

mod sequencer;
use self::sequencer::SequencerClient;

impl From<alsa::Error> for EndpointError {
    fn from(err: alsa::Error) -> Self {
        EndpointError::Transport {
            msg: err.to_string().into(),
        }
    }
}

fn client_name(config: &Config) -> Result<CString, EndpointError> {
    CString::new(config.client_name.as_bytes())
        .map_err(|err| EndpointError::transport(format!("invalid client name: {err}")))
}

/// Transport for the ALSA raw MIDI and sequencer interfaces
#[expect(missing_debug_implementations)]
pub struct AlsaTransport {
    sequencer: Option<Arc<SequencerClient>>,
}

impl AlsaTransport {
    /// Connect to the sound system.
    ///
    /// A sequencer client is only opened if ports of software clients
    /// are tracked.
    pub fn open(config: &Config) -> Result<Self, EndpointError> {
        let sequencer = if config.is_family_enabled(DeviceFamily::Virtual) {
            let sequencer = SequencerClient::open(client_name(config)?)?;
            log::info!(
                "Opened sequencer client {client_id}",
                client_id = sequencer.client_id()
            );
            Some(Arc::new(sequencer))
        } else {
            None
        };
        Ok(Self { sequencer })
    }

    fn sequencer(&self) -> Result<&Arc<SequencerClient>, EndpointError> {
        self.sequencer
            .as_ref()
            .ok_or_else(|| EndpointError::transport("sequencer not opened"))
    }
}

impl Transport for AlsaTransport {
    fn enumerate(&self, family: DeviceFamily) -> Result<Vec<DiscoveredEndpoint>, EnumerationError> {
        match family {
            DeviceFamily::Hardware => hardware::enumerate().map_err(|err| EnumerationError {
                family,
                msg: err.to_string().into(),
            }),
            DeviceFamily::Virtual => Ok(self
                .sequencer
                .as_deref()
                .map(SequencerClient::enumerate)
                .unwrap_or_default()),
        }
    }

    fn open_input(&self, endpoint: &DiscoveredEndpoint) -> Result<BoxedInputEndpoint, EndpointError> {
        match endpoint.address.family() {
            DeviceFamily::Hardware => hardware::open_input(&endpoint.address),
            DeviceFamily::Virtual => self.sequencer()?.open_input(&endpoint.address),
        }
    }

    fn open_output(
        &self,
        endpoint: &DiscoveredEndpoint,
    ) -> Result<SharedOutputEndpoint, EndpointError> {
        match endpoint.address.family() {
            DeviceFamily::Hardware => hardware::open_output(&endpoint.address),
            DeviceFamily::Virtual => {
                SequencerClient::open_output(self.sequencer()?, &endpoint.address)
            }
        }
    }
}
