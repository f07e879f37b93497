// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    ffi::{CStr, CString},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alsa::{
    seq::{Addr, ClientIter, EventType, PortCap, PortIter, PortSubscribe, PortType},
    Seq,
};

use crate::{
    midi::{encode, MidiEvent},
    registry::{Direction, EndpointAddress},
    transport::{
        BoxedInputEndpoint, DiscoveredEndpoint, EndpointError, InputEndpoint, OutputEndpoint,
        PendingBytes, SharedOutputEndpoint,
    },
};

/// Client ids below are reserved for the system and sound cards.
const FIRST_USER_CLIENT_ID: i32 = 128;

const PORT_NAME: &CStr = c"inout";

/// Channel and system common messages without system exclusive
const MAX_SHORT_MESSAGE_LEN: u32 = 3;

/// Capabilities of a port that other clients could read from.
const READABLE: PortCap = PortCap::READ.union(PortCap::SUBS_READ);

/// Capabilities of a port that other clients could write to.
const WRITABLE: PortCap = PortCap::WRITE.union(PortCap::SUBS_WRITE);

fn open_seq(client_name: &CStr) -> Result<Seq, alsa::Error> {
    let seq = Seq::open(None, None, true)?;
    seq.set_client_name(client_name)?;
    Ok(seq)
}

fn virtual_address(address: &EndpointAddress) -> Result<Addr, EndpointError> {
    let EndpointAddress::Virtual { client, port } = *address else {
        return Err(EndpointError::transport(format!(
            "not a sequencer port: {address:?}"
        )));
    };
    Ok(Addr { client, port })
}

/// The sequencer client of this process
///
/// Used for enumerating the ports of other clients and for sending
/// messages to them.
pub(super) struct SequencerClient {
    seq: Mutex<Seq>,
    client_name: CString,
    client_id: i32,
    port: i32,
}

impl SequencerClient {
    pub(super) fn open(client_name: CString) -> Result<Self, alsa::Error> {
        let seq = open_seq(&client_name)?;
        let client_id = seq.client_id()?;
        let port = seq.create_simple_port(
            PORT_NAME,
            READABLE | WRITABLE,
            PortType::MIDI_GENERIC | PortType::APPLICATION,
        )?;
        Ok(Self {
            seq: Mutex::new(seq),
            client_name,
            client_id,
            port,
        })
    }

    pub(super) const fn client_id(&self) -> i32 {
        self.client_id
    }

    fn lock(&self) -> MutexGuard<'_, Seq> {
        self.seq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clients whose name could not be queried are skipped.
    pub(super) fn enumerate(&self) -> Vec<DiscoveredEndpoint> {
        let seq = self.lock();
        let mut discovered = Vec::new();
        for client_info in ClientIter::new(&seq) {
            let client = client_info.get_client();
            if client < FIRST_USER_CLIENT_ID || client == self.client_id {
                continue;
            }
            let name = match client_info.get_name() {
                Ok(name) => name,
                Err(err) => {
                    log::debug!("Skipping sequencer client {client}: {err}");
                    continue;
                }
            };
            for port_info in PortIter::new(&seq, client) {
                let caps = port_info.get_capability();
                if caps.contains(PortCap::NO_EXPORT) {
                    continue;
                }
                let address = EndpointAddress::Virtual {
                    client,
                    port: port_info.get_port(),
                };
                if caps.contains(READABLE) {
                    discovered.push(DiscoveredEndpoint::new(address, Direction::Input, name));
                }
                if caps.contains(WRITABLE) {
                    discovered.push(DiscoveredEndpoint::new(address, Direction::Output, name));
                }
            }
        }
        discovered
    }

    /// Subscribe to a port of another client.
    ///
    /// Each input uses a dedicated client and a private port. The
    /// subscription is removed when the endpoint is dropped.
    pub(super) fn open_input(
        &self,
        address: &EndpointAddress,
    ) -> Result<BoxedInputEndpoint, EndpointError> {
        let sender = virtual_address(address)?;
        let seq = open_seq(&self.client_name)?;
        let port = seq.create_simple_port(
            PORT_NAME,
            WRITABLE | PortCap::NO_EXPORT,
            PortType::MIDI_GENERIC | PortType::APPLICATION,
        )?;
        let subscription = PortSubscribe::empty()?;
        subscription.set_sender(sender);
        subscription.set_dest(Addr {
            client: seq.client_id()?,
            port,
        });
        seq.subscribe_port(&subscription)?;
        log::debug!(
            "Subscribed to sequencer port {client}:{port}",
            client = sender.client,
            port = sender.port
        );
        Ok(Box::new(SequencerInput {
            seq,
            pending: PendingBytes::new(),
        }))
    }

    pub(super) fn open_output(
        client: &Arc<Self>,
        address: &EndpointAddress,
    ) -> Result<SharedOutputEndpoint, EndpointError> {
        let dest = virtual_address(address)?;
        Ok(Arc::new(SequencerOutput {
            client: Arc::clone(client),
            dest,
        }))
    }
}

struct SequencerInput {
    seq: Seq,
    pending: PendingBytes,
}

impl SequencerInput {
    /// Convert all events that are ready into wire bytes.
    fn receive_pending_events(&mut self) -> Result<(), EndpointError> {
        let mut input = self.seq.input();
        let codec = alsa::seq::MidiEvent::new(MAX_SHORT_MESSAGE_LEN)?;
        codec.enable_running_status(false);
        let mut scratch = [0; MAX_SHORT_MESSAGE_LEN as usize];
        while input.event_input_pending(true)? > 0 {
            let mut event = input.event_input()?;
            if event.get_type() == EventType::Sysex {
                // Might exceed any read buffer
                if let Some(ext) = event.get_ext() {
                    self.pending.push(ext);
                }
                continue;
            }
            match codec.decode(&mut scratch, &mut event) {
                Ok(len) => self.pending.push(&scratch[..len]),
                Err(err) => {
                    // Announcements and other non-MIDI events
                    log::trace!(
                        "Skipping event of type {event_type:?}: {err}",
                        event_type = event.get_type()
                    );
                }
            }
        }
        Ok(())
    }
}

impl InputEndpoint for SequencerInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        if self.pending.is_empty() {
            self.receive_pending_events()?;
        }
        Ok(self.pending.read_into(buf))
    }
}

struct SequencerOutput {
    client: Arc<SequencerClient>,
    dest: Addr,
}

impl OutputEndpoint for SequencerOutput {
    fn send(&self, event: &MidiEvent) -> Result<(), EndpointError> {
        let message = encode(event);
        let mut bytes = message.as_bytes();
        let codec = alsa::seq::MidiEvent::new(u32::try_from(bytes.len()).unwrap_or(u32::MAX))?;
        codec.enable_running_status(false);
        let seq = self.client.lock();
        while !bytes.is_empty() {
            let (consumed, event) = codec.encode(bytes)?;
            if consumed == 0 {
                return Err(EndpointError::transport("incomplete message"));
            }
            bytes = &bytes[consumed..];
            let Some(mut event) = event else {
                continue;
            };
            event.set_source(self.client.port);
            event.set_dest(self.dest);
            event.set_direct();
            seq.event_output_direct(&mut event)?;
        }
        Ok(())
    }
}
