// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

use std::io::stdin;

use midiplug::{midi::alsa::AlsaTransport, Config, MidiDeviceManager};

fn main() {
    pretty_env_logger::init();

    match run() {
        Ok(()) => (),
        Err(err) => println!("Error: {err}"),
    }
}

fn print_notification(name: &str, payload: &str) {
    println!("{name}: {payload}");
}

fn run() -> anyhow::Result<()> {
    let config = Config::default();
    let transport = AlsaTransport::open(&config)?;
    let mut manager = MidiDeviceManager::new(transport, print_notification, config);
    manager.start()?;

    println!("Tracking MIDI devices, press ENTER to exit...");
    let mut input = String::new();
    stdin().read_line(&mut input)?;

    manager.shutdown()
}
