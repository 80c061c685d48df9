//! Client side of the broker.
//!
//! [`SttClient`] is what downstream consumers bind to receive transcription
//! responses. [`RequestSender`] pushes audio requests into the broker.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::messaging::{decode_response, encode_request, AudioRequest, TranscriptionResponse};
use crate::transport::zmq_bridge::recv_routed;

/// Ends a running [`SttClient::listen`] from another thread.
#[derive(Debug, Clone)]
pub struct ClientStopHandle {
    running: Arc<AtomicBool>,
}

impl ClientStopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Stopping listener");
    }
}

/// Consumer of the response stream. Binds a ROUTER endpoint that the
/// broker's outbound DEALER connects to.
pub struct SttClient {
    context: zmq::Context,
    bind_address: String,
    socket: Option<zmq::Socket>,
    running: Arc<AtomicBool>,
}

impl SttClient {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self::with_context(zmq::Context::new(), bind_address)
    }

    pub fn with_context(context: zmq::Context, bind_address: impl Into<String>) -> Self {
        let bind_address = bind_address.into();
        info!("SttClient initialized: bind_address={}", bind_address);
        Self {
            context,
            bind_address,
            socket: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Bind the ROUTER socket. Calling it again while bound is a no-op.
    pub fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            warn!("Already connected");
            return Ok(());
        }

        let socket = self.context.socket(zmq::ROUTER)?;
        socket.set_linger(0)?;
        socket.bind(&self.bind_address)?;
        info!("ROUTER socket bound to {}", self.bind_address);
        self.socket = Some(socket);
        Ok(())
    }

    /// Wait at most `timeout` for one response.
    ///
    /// Malformed frames are logged and skipped, yielding `Ok(None)`.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<TranscriptionResponse>> {
        let socket = self.socket.as_ref().ok_or_else(not_connected)?;

        let Some((_, payload)) = recv_routed(socket, timeout)? else {
            return Ok(None);
        };

        match decode_response(&payload) {
            Ok(response) => {
                debug!(
                    request_id = %response.request_id(),
                    status = %response.status(),
                    "Received transcription"
                );
                Ok(Some(response))
            }
            Err(err) => {
                error!("Failed to deserialize response: {}", err);
                Ok(None)
            }
        }
    }

    /// Invoke `callback` for every response until stopped through a
    /// [`ClientStopHandle`]. Callback failures are logged and listening
    /// continues.
    pub fn listen<F, E>(&mut self, mut callback: F, timeout: Duration) -> Result<()>
    where
        F: FnMut(TranscriptionResponse) -> std::result::Result<(), E>,
        E: fmt::Display,
    {
        if self.socket.is_none() {
            return Err(not_connected());
        }

        self.running.store(true, Ordering::SeqCst);
        info!("Started listening for transcriptions");

        while self.running.load(Ordering::SeqCst) {
            let Some(response) = self.receive(timeout)? else {
                continue;
            };
            let request_id = response.request_id().to_string();
            if let Err(err) = callback(response) {
                error!("Callback error for request {}: {}", request_id, err);
            }
        }

        info!("Stopped listening for transcriptions");
        Ok(())
    }

    pub fn stop_handle(&self) -> ClientStopHandle {
        ClientStopHandle {
            running: self.running.clone(),
        }
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn disconnect(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if self.socket.take().is_some() {
            info!("Disconnected STT client from {}", self.bind_address);
        }
    }
}

impl Drop for SttClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn not_connected() -> Error {
    Error::Transport("not connected, call connect() first".to_string())
}

const SENDER_LINGER_MS: i32 = 2_000;

/// Pushes audio requests into the broker's inbound endpoint.
pub struct RequestSender {
    socket: zmq::Socket,
    address: String,
}

impl RequestSender {
    pub fn connect(address: &str) -> Result<Self> {
        Self::connect_with(&zmq::Context::new(), address)
    }

    pub fn connect_with(context: &zmq::Context, address: &str) -> Result<Self> {
        let socket = context.socket(zmq::DEALER)?;
        // Short-lived senders exit right after sending; give queued
        // requests a bounded window to leave.
        socket.set_linger(SENDER_LINGER_MS)?;
        socket.connect(address)?;
        debug!("Request sender connected to {}", address);
        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn send(&self, request: &AudioRequest) -> Result<()> {
        let payload = encode_request(request)?;
        self.socket.send(payload, 0)?;
        debug!(
            request_id = %request.request_id,
            bytes = request.audio_data.len(),
            "Sent request"
        );
        Ok(())
    }

    /// Send raw bytes as a request payload, bypassing the codec.
    pub fn send_raw(&self, payload: &[u8]) -> Result<()> {
        self.socket.send(payload, 0)?;
        Ok(())
    }
}
