// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    io::{self, Read as _, Write as _},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use alsa::{ctl::Ctl, rawmidi::Rawmidi};

use crate::{
    midi::{encode, MidiEvent},
    registry::{Direction, EndpointAddress},
    transport::{
        BoxedInputEndpoint, DiscoveredEndpoint, EndpointError, InputEndpoint, OutputEndpoint,
        SharedOutputEndpoint,
    },
};

/// Give up if the output buffer of the device does not drain in time.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Enumerate the raw MIDI ports of all sound cards.
///
/// Cards and ports that could not be queried are skipped. Fails only
/// if the cards could not be enumerated.
pub(super) fn enumerate() -> Result<Vec<DiscoveredEndpoint>, alsa::Error> {
    let mut discovered = Vec::new();
    for card in alsa::card::Iter::new() {
        // The remaining cards are unknown
        let card = card?;
        let index = card.get_index();
        let ctl = match Ctl::from_card(&card, false) {
            Ok(ctl) => ctl,
            Err(err) => {
                log::debug!("Skipping card {index}: {err}");
                continue;
            }
        };
        let name = match card.get_name() {
            Ok(name) => name,
            Err(err) => {
                log::debug!("Skipping card {index}: {err}");
                continue;
            }
        };
        for info in alsa::rawmidi::Iter::new(&ctl) {
            let info = match info {
                Ok(info) => info,
                Err(err) => {
                    // The iterator would not advance
                    log::debug!("Skipping remaining raw MIDI ports of card {index}: {err}");
                    break;
                }
            };
            let direction = match info.get_stream() {
                alsa::Direction::Capture => Direction::Input,
                alsa::Direction::Playback => Direction::Output,
            };
            let address = EndpointAddress::Hardware {
                card: index,
                device: info.get_device(),
                subdevice: info.get_subdevice(),
            };
            discovered.push(DiscoveredEndpoint::new(address, direction, name.as_str()));
        }
    }
    Ok(discovered)
}

fn open_rawmidi(
    address: &EndpointAddress,
    direction: alsa::Direction,
) -> Result<Rawmidi, EndpointError> {
    let EndpointAddress::Hardware {
        card,
        device,
        subdevice,
    } = *address
    else {
        return Err(EndpointError::transport(format!(
            "not a hardware port: {address:?}"
        )));
    };
    let name = format!("hw:{card},{device},{subdevice}");
    // Non-blocking, otherwise opening a busy port would stall the reconciler
    let rawmidi = Rawmidi::new(&name, direction, true)?;
    log::debug!("Opened raw MIDI port {name}");
    Ok(rawmidi)
}

struct RawmidiInput {
    rawmidi: Rawmidi,
}

impl InputEndpoint for RawmidiInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        match self.rawmidi.io().read(buf) {
            Ok(len) => Ok(len),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

pub(super) fn open_input(address: &EndpointAddress) -> Result<BoxedInputEndpoint, EndpointError> {
    let rawmidi = open_rawmidi(address, alsa::Direction::Capture)?;
    Ok(Box::new(RawmidiInput { rawmidi }))
}

struct RawmidiOutput {
    rawmidi: Mutex<Rawmidi>,
}

impl OutputEndpoint for RawmidiOutput {
    fn send(&self, event: &MidiEvent) -> Result<(), EndpointError> {
        let message = encode(event);
        let mut bytes = message.as_bytes();
        let rawmidi = self.rawmidi.lock().unwrap_or_else(PoisonError::into_inner);
        let mut io = rawmidi.io();
        let deadline = Instant::now() + WRITE_TIMEOUT;
        while !bytes.is_empty() {
            match io.write(bytes) {
                Ok(0) => return Err(EndpointError::Disconnected),
                Ok(written) => bytes = &bytes[written..],
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(EndpointError::transport("write timed out"));
                    }
                    std::thread::sleep(WRITE_RETRY_INTERVAL);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => (),
                Err(err) => return Err(err.into()),
            }
        }
        io.flush()?;
        Ok(())
    }
}

pub(super) fn open_output(address: &EndpointAddress) -> Result<SharedOutputEndpoint, EndpointError> {
    let rawmidi = open_rawmidi(address, alsa::Direction::Playback)?;
    Ok(Arc::new(RawmidiOutput {
        rawmidi: Mutex::new(rawmidi),
    }))
}
