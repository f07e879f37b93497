// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

use std::{borrow::Cow, time::Duration};

use crate::registry::DeviceFamily;

pub const DEFAULT_CLIENT_NAME: &str = "Midi Handler";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(10);

pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Runtime configuration of a [`MidiDeviceManager`](crate::MidiDeviceManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the sequencer client as shown to other applications.
    pub client_name: Cow<'static, str>,

    /// Interval between two enumeration passes of the reconciler.
    pub poll_interval: Duration,

    /// Sleep duration of input workers if no bytes are pending.
    pub idle_backoff: Duration,

    /// Size of the per-worker receive buffer.
    pub read_buffer_size: usize,

    /// Track hardware ports.
    pub hardware: bool,

    /// Track ports of software clients.
    pub virtual_ports: bool,

    /// Discard system exclusive messages that exceed this size.
    ///
    /// Unlimited if `None`.
    pub max_sysex_len: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_name: Cow::Borrowed(DEFAULT_CLIENT_NAME),
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            hardware: true,
            virtual_ports: true,
            max_sysex_len: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_client_name(mut self, client_name: impl Into<Cow<'static, str>>) -> Self {
        self.client_name = client_name.into();
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub const fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Set the receive buffer size.
    ///
    /// The size is at least 1 byte.
    #[must_use]
    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size.max(1);
        self
    }

    #[must_use]
    pub const fn with_family(mut self, family: DeviceFamily, enabled: bool) -> Self {
        match family {
            DeviceFamily::Hardware => self.hardware = enabled,
            DeviceFamily::Virtual => self.virtual_ports = enabled,
        }
        self
    }

    #[must_use]
    pub const fn with_max_sysex_len(mut self, max_sysex_len: Option<usize>) -> Self {
        self.max_sysex_len = max_sysex_len;
        self
    }

    #[must_use]
    pub const fn is_family_enabled(&self, family: DeviceFamily) -> bool {
        match family {
            DeviceFamily::Hardware => self.hardware,
            DeviceFamily::Virtual => self.virtual_ports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!("Midi Handler", config.client_name);
        assert_eq!(Duration::from_millis(100), config.poll_interval);
        assert_eq!(Duration::from_millis(10), config.idle_backoff);
        assert_eq!(1024, config.read_buffer_size);
        assert!(config.is_family_enabled(DeviceFamily::Hardware));
        assert!(config.is_family_enabled(DeviceFamily::Virtual));
        assert_eq!(None, config.max_sysex_len);
    }

    #[test]
    fn builder() {
        let config = Config::default()
            .with_client_name("Test")
            .with_family(DeviceFamily::Virtual, false)
            .with_read_buffer_size(0);
        assert_eq!("Test", config.client_name);
        assert!(config.is_family_enabled(DeviceFamily::Hardware));
        assert!(!config.is_family_enabled(DeviceFamily::Virtual));
        assert_eq!(1, config.read_buffer_size);
    }
}
