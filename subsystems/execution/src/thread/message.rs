//! # Thread Messages
//!
//! Units of work moved into a thread's mailbox. A message is owned by exactly
//! one mailbox at a time and consumed once.

use super::ThreadHandle;
use alloc::vec::Vec;
use core::fmt;

/// Message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Run the payload as a program in the recipient's context
    Evaluate,
}

/// Opaque byte payload of a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportData {
    bytes: Vec<u8>,
}

impl TransportData {
    /// Create an empty payload
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Payload copied from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { bytes: bytes.to_vec() }
    }

    /// Replace the payload with the bytes of `s`
    pub fn set_string(&mut self, s: &str) {
        self.bytes.clear();
        self.bytes.extend_from_slice(s.as_bytes());
    }

    /// Raw payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Is the payload empty?
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Take the payload
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A message addressed to one thread
pub struct ThreadMessage {
    kind: MessageType,
    sender: Option<ThreadHandle>,
    data: TransportData,
}

impl ThreadMessage {
    /// Create a message; `sender` is the reply target, if any
    pub fn new(kind: MessageType, sender: Option<ThreadHandle>, data: TransportData) -> Self {
        Self { kind, sender, data }
    }

    /// Message type
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Reply target
    pub fn sender(&self) -> Option<&ThreadHandle> {
        self.sender.as_ref()
    }

    /// Payload
    pub fn data(&self) -> &TransportData {
        &self.data
    }

    /// Split into reply target and payload
    pub fn into_parts(self) -> (Option<ThreadHandle>, TransportData) {
        (self.sender, self.data)
    }
}

impl fmt::Debug for ThreadMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadMessage")
            .field("kind", &self.kind)
            .field("sender", &self.sender.as_ref().map(|t| t.id()))
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_string_replaces_payload() {
        let mut data = TransportData::from_bytes(b"stale bytes");
        data.set_string("print(1)");
        assert_eq!(data.as_bytes(), b"print(1)");
        assert_eq!(data.len(), 8);
        assert!(!data.is_empty());
        assert!(TransportData::new().is_empty());
    }

    #[test]
    fn test_message_parts() {
        let msg = ThreadMessage::new(
            MessageType::Evaluate,
            None,
            TransportData::from_bytes(b"1 + 1"),
        );
        assert_eq!(msg.kind(), MessageType::Evaluate);
        assert!(msg.sender().is_none());

        let (sender, data) = msg.into_parts();
        assert!(sender.is_none());
        assert_eq!(data.into_bytes(), b"1 + 1".to_vec());
    }
}
