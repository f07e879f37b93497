// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

use std::collections::VecDeque;

/// Received bytes that did not fit into the read buffer
///
/// Transports that receive whole messages, e.g. large system exclusive
/// messages, hand them out in chunks across multiple reads.
#[derive(Debug, Default)]
pub struct PendingBytes {
    bytes: VecDeque<u8>,
}

impl PendingBytes {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend(bytes);
    }

    /// Move as many bytes as possible into `buf`.
    ///
    /// Returns the number of bytes written.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.bytes.len());
        for (dst, src) in buf.iter_mut().zip(self.bytes.drain(..len)) {
            *dst = src;
        }
        len
    }
}
