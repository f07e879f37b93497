// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

#![allow(rustdoc::invalid_rust_codeblocks)]
#![doc = include_str!("../README.md")]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(rustdoc::broken_intra_doc_links)]
// Repetitions of module/type names occur frequently when using many
// modules for keeping the size of the source files handy. Often
// types have the same name as their parent module.
#![allow(clippy::module_name_repetitions)]
// Repeating the type name in `..Default::default()` expressions
// is not needed since the context is obvious.
#![allow(clippy::default_trait_access)]

pub mod config;
pub use self::config::Config;

pub mod hotplug;

pub mod manager;
pub use self::manager::{MidiDeviceManager, SendError, StartError};

pub mod midi;
pub use self::midi::{MidiDecoder, MidiEvent, MidiEventKind, WireMessage};

pub mod notify;
pub use self::notify::{EventSink, LogEventSink, Notification};

pub mod registry;
pub use self::registry::{DeviceFamily, DeviceId, DeviceName, Direction, EndpointKind};

pub mod transport;
pub use self::transport::{
    DiscoveredEndpoint, EndpointError, EnumerationError, InputEndpoint, OutputEndpoint, Transport,
};
