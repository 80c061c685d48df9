//! Transport seams between the service loop and the wire.
//!
//! Inbound requests carry the identity of the peer that sent them. Outbound
//! responses carry none: correlation downstream relies on `request_id` alone.

pub(crate) mod zmq_bridge;

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::messaging::{AudioRequest, TranscriptionResponse};

pub use zmq_bridge::{ZmqInbound, ZmqOutbound};

/// Opaque identity assigned to a sender by the inbound endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(Vec<u8>);

impl PeerAddress {
    pub fn new(identity: Vec<u8>) -> Self {
        Self(identity)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A decoded request and the peer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    pub peer: PeerAddress,
    pub request: AudioRequest,
}

/// Where requests come from.
pub trait RequestSource {
    /// Wait at most `timeout` for one request.
    ///
    /// `Ok(None)` means nothing arrived in time. A frame that cannot be
    /// decoded is consumed and reported as [`crate::Error::Decode`].
    fn receive(&mut self, timeout: Duration) -> Result<Option<InboundRequest>>;

    /// Stop accepting requests.
    fn close(&mut self) {}
}

/// Where responses go.
pub trait ResponseSink {
    fn send(&mut self, response: &TranscriptionResponse) -> Result<()>;

    fn close(&mut self) {}
}
