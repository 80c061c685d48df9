//! STT Core - speech-to-text inference broker
//!
//! Accepts audio requests on a ZeroMQ ROUTER endpoint, runs them through an
//! admission pipeline and a lazily loaded inference engine, and relays the
//! transcription responses to a downstream DEALER endpoint.
//!
//! # Architecture
//!
//! ```text
//! peer -> ZmqInbound (decode) -> AudioAdmission -> EngineManager -> SpeechModel
//!                                                                      |
//!            downstream <- ZmqOutbound (encode) <- SttService response <-+
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stt_core::{SttConfig, SttService, WorkerLoader};
//!
//! let config = SttConfig::load(None)?;
//! let loader = WorkerLoader::from_config(&config.model);
//! let mut service = SttService::bind(&config, Box::new(loader))?;
//! service.run()?;
//! ```

pub mod audio;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod service;
pub mod transport;

pub use audio::{
    AdmissionPolicy, AudioAdmission, AudioDecoder, DecodedAudio, StagedAudio, SymphoniaDecoder,
};
pub use client::{ClientStopHandle, RequestSender, SttClient};
pub use config::{ConfigOverrides, ModelConfig, SttConfig};
pub use engine::{
    EngineHandle, EngineLoader, EngineManager, IdleMonitor, SpeechModel, Transcript, WorkerEngine,
    WorkerLoader,
};
pub use error::{Error, Result};
pub use messaging::{
    decode_request, decode_response, encode_request, encode_response, AudioFormat, AudioRequest,
    ResponseStatus, TranscriptionResponse,
};
pub use service::{ServiceState, ShutdownSignal, SttService};
pub use transport::{
    InboundRequest, PeerAddress, RequestSource, ResponseSink, ZmqInbound, ZmqOutbound,
};
