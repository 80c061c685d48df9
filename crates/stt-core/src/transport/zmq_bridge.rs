//! ZeroMQ endpoints: ROUTER in, DEALER out.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::messaging::{decode_request, encode_response, TranscriptionResponse};
use crate::transport::{InboundRequest, PeerAddress, RequestSource, ResponseSink};

/// Inbound ROUTER endpoint. Many peers, each identified by address.
pub struct ZmqInbound {
    socket: zmq::Socket,
    address: String,
}

impl ZmqInbound {
    pub fn bind(context: &zmq::Context, address: &str) -> Result<Self> {
        let socket = context.socket(zmq::ROUTER)?;
        socket.set_linger(0)?;
        socket.bind(address)?;
        info!("ROUTER socket bound to {}", address);
        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl RequestSource for ZmqInbound {
    fn receive(&mut self, timeout: Duration) -> Result<Option<InboundRequest>> {
        let Some((identity, payload)) = recv_routed(&self.socket, timeout)? else {
            return Ok(None);
        };

        let peer = PeerAddress::new(identity);
        let request = decode_request(&payload).map_err(|err| {
            error!("Failed to deserialize request from {}: {}", peer, err);
            err
        })?;

        debug!(
            request_id = %request.request_id,
            peer = %peer,
            "Received request"
        );
        Ok(Some(InboundRequest { peer, request }))
    }

    fn close(&mut self) {
        match self.socket.unbind(&self.address) {
            Ok(()) => info!("ROUTER socket unbound from {}", self.address),
            Err(err) => debug!("Failed to unbind {}: {}", self.address, err),
        }
    }
}

/// Outbound DEALER endpoint. Sends bare payloads with no identity framing.
pub struct ZmqOutbound {
    socket: zmq::Socket,
    address: String,
}

impl ZmqOutbound {
    pub fn connect(context: &zmq::Context, address: &str) -> Result<Self> {
        let socket = context.socket(zmq::DEALER)?;
        socket.set_linger(0)?;
        socket.connect(address)?;
        info!("DEALER socket connected to {}", address);
        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl ResponseSink for ZmqOutbound {
    fn send(&mut self, response: &TranscriptionResponse) -> Result<()> {
        let payload = encode_response(response)?;
        self.socket.send(payload, 0)?;
        debug!(
            request_id = %response.request_id(),
            status = %response.status(),
            "Sent response"
        );
        Ok(())
    }

    fn close(&mut self) {
        match self.socket.disconnect(&self.address) {
            Ok(()) => info!("DEALER socket disconnected from {}", self.address),
            Err(err) => debug!("Failed to disconnect {}: {}", self.address, err),
        }
    }
}

/// Poll a ROUTER socket and return `(identity, payload)` for one message.
///
/// The payload is the last frame, which tolerates senders that do and do not
/// insert an empty delimiter. Messages with fewer than two frames are logged
/// and dropped.
pub(crate) fn recv_routed(
    socket: &zmq::Socket,
    timeout: Duration,
) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    match socket.poll(zmq::POLLIN, timeout_ms) {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(zmq::Error::EINTR) => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let mut frames = match socket.recv_multipart(zmq::DONTWAIT) {
        Ok(frames) => frames,
        Err(zmq::Error::EAGAIN) => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if frames.len() < 2 {
        error!(
            "Invalid message format: expected at least 2 parts, got {}",
            frames.len()
        );
        return Ok(None);
    }

    let payload = frames.pop().unwrap_or_default();
    let identity = frames.swap_remove(0);
    Ok(Some((identity, payload)))
}
