//! The broker service loop.
//!
//! One request is handled at a time: receive, validate, admit, transcribe,
//! respond. Every per-request failure becomes an error response and the loop
//! carries on. Shutdown is cooperative and observed between requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::audio::{AudioAdmission, StagedAudio};
use crate::config::SttConfig;
use crate::engine::{EngineLoader, EngineManager, IdleMonitor, Transcript};
use crate::error::{Error, Result};
use crate::messaging::{AudioRequest, TranscriptionResponse};
use crate::transport::{InboundRequest, RequestSource, ResponseSink, ZmqInbound, ZmqOutbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// Cooperative shutdown flag shared with signal handlers.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SttService<S, K> {
    source: S,
    sink: K,
    admission: AudioAdmission,
    engine: Arc<EngineManager>,
    monitor: Option<IdleMonitor>,
    monitor_interval: Duration,
    poll_interval: Duration,
    shutdown: ShutdownSignal,
    state: ServiceState,
}

impl SttService<ZmqInbound, ZmqOutbound> {
    /// Bind both ZeroMQ endpoints. Bind failures are fatal and happen before
    /// the loop starts.
    pub fn bind(config: &SttConfig, loader: Box<dyn EngineLoader>) -> Result<Self> {
        config.validate()?;
        info!("Setting up ZMQ sockets...");
        let context = zmq::Context::new();
        let source = ZmqInbound::bind(&context, &config.input_address)?;
        let sink = ZmqOutbound::connect(&context, &config.output_address)?;
        Ok(Self::new(source, sink, config, loader))
    }
}

impl<S: RequestSource, K: ResponseSink> SttService<S, K> {
    pub fn new(source: S, sink: K, config: &SttConfig, loader: Box<dyn EngineLoader>) -> Self {
        let admission = AudioAdmission::new(config.admission_policy());
        let engine = Arc::new(EngineManager::new(loader, config.idle_timeout()));
        Self::with_parts(
            source,
            sink,
            admission,
            engine,
            config.monitor_interval(),
            config.poll_interval(),
        )
    }

    pub fn with_parts(
        source: S,
        sink: K,
        admission: AudioAdmission,
        engine: Arc<EngineManager>,
        monitor_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            admission,
            engine,
            monitor: None,
            monitor_interval,
            poll_interval,
            shutdown: ShutdownSignal::new(),
            state: ServiceState::Initializing,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn engine(&self) -> &Arc<EngineManager> {
        &self.engine
    }

    /// Serve requests until the shutdown signal is triggered.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;

        while !self.shutdown.is_triggered() {
            match self.source.receive(self.poll_interval) {
                Ok(Some(inbound)) => {
                    self.handle(inbound);
                }
                Ok(None) => {}
                Err(Error::Decode(reason)) => {
                    error!("Dropping malformed request: {}", reason);
                }
                Err(err) => {
                    error!("Failed to receive request: {}", err);
                    std::thread::sleep(self.poll_interval);
                }
            }
        }

        self.state = ServiceState::ShuttingDown;
        info!("Shutting down STT service...");
        self.stop();
        Ok(())
    }

    /// Process one request and send its response. Returns the response that
    /// was sent (or attempted).
    pub fn handle(&mut self, inbound: InboundRequest) -> TranscriptionResponse {
        let InboundRequest { peer, request } = inbound;
        debug!(request_id = %request.request_id, peer = %peer, "Processing request");

        let started = Instant::now();
        let outcome = self.process(&request);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let response = match outcome {
            Ok(transcript) => TranscriptionResponse::success(
                request.request_id.as_str(),
                transcript.text,
                transcript.confidence,
                elapsed_ms,
            ),
            Err(err) => {
                if err.is_reportable() {
                    warn!(request_id = %request.request_id, "{}", err);
                } else {
                    error!(request_id = %request.request_id, "Unexpected failure: {}", err.detail());
                }
                TranscriptionResponse::error(request.request_id.as_str(), err.to_string(), elapsed_ms)
            }
        };

        info!(
            request_id = %response.request_id(),
            status = %response.status(),
            elapsed_ms,
            "Request processed"
        );

        if let Err(err) = self.sink.send(&response) {
            error!(
                "Failed to send response for request {}: {}",
                response.request_id(),
                err
            );
        }
        response
    }

    fn process(&self, request: &AudioRequest) -> Result<Transcript> {
        let format = request.validate()?;
        let staged = self.admission.admit_request(request, format)?;

        let outcome = self.transcribe(&staged);
        if let Err(err) = staged.close() {
            warn!("Failed to clean up staged audio: {}", err);
        }
        outcome
    }

    fn transcribe(&self, staged: &StagedAudio) -> Result<Transcript> {
        let mut engine = self.engine.acquire()?;
        engine.transcribe(staged.path())
    }

    fn start(&mut self) -> Result<()> {
        if self.monitor.is_none() {
            self.monitor = Some(IdleMonitor::spawn(
                self.engine.clone(),
                self.monitor_interval,
            )?);
        }
        self.state = ServiceState::Running;
        info!("STT service started, waiting for requests");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.source.close();
        self.sink.close();
        if let Err(err) = self.engine.release() {
            warn!("Failed to release engine: {}", err);
        }
        self.state = ServiceState::Stopped;
        info!("STT service stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use super::*;
    use crate::audio::decode::tests::wav_bytes;
    use crate::audio::AdmissionPolicy;
    use crate::engine::lifecycle::tests::CountingLoader;
    use crate::messaging::AudioFormat;
    use crate::transport::PeerAddress;

    /// Replays scripted receive outcomes, then triggers shutdown.
    struct ScriptedSource {
        script: VecDeque<Result<Option<InboundRequest>>>,
        shutdown: Option<ShutdownSignal>,
        closed: Arc<AtomicBool>,
    }

    impl RequestSource for ScriptedSource {
        fn receive(&mut self, _timeout: Duration) -> Result<Option<InboundRequest>> {
            match self.script.pop_front() {
                Some(step) => step,
                None => {
                    if let Some(signal) = &self.shutdown {
                        signal.trigger();
                    }
                    Ok(None)
                }
            }
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<TranscriptionResponse>>>,
        failures_left: Arc<Mutex<usize>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<TranscriptionResponse> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ResponseSink for RecordingSink {
        fn send(&mut self, response: &TranscriptionResponse) -> Result<()> {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Transport("peer unreachable".to_string()));
            }
            self.sent.lock().unwrap().push(response.clone());
            Ok(())
        }
    }

    struct Harness {
        service: SttService<ScriptedSource, RecordingSink>,
        sink: RecordingSink,
        loader: CountingLoader,
        closed: Arc<AtomicBool>,
        staging: tempfile::TempDir,
    }

    fn harness(script: Vec<Result<Option<InboundRequest>>>, loader: CountingLoader) -> Harness {
        let staging = tempfile::tempdir().unwrap();
        let closed = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            script: script.into(),
            shutdown: None,
            closed: closed.clone(),
        };
        let sink = RecordingSink::default();
        let admission = AudioAdmission::new(AdmissionPolicy {
            expected_sample_rate: 16_000,
            convert_to_mono: false,
            staging_dir: Some(staging.path().to_path_buf()),
        });
        let engine = Arc::new(EngineManager::new(
            Box::new(loader.clone()),
            Duration::from_secs(600),
        ));

        let mut service = SttService::with_parts(
            source,
            sink.clone(),
            admission,
            engine,
            Duration::from_secs(60),
            Duration::from_millis(10),
        );
        service.source.shutdown = Some(service.shutdown_signal());

        Harness {
            service,
            sink,
            loader,
            closed,
            staging,
        }
    }

    fn inbound(request: AudioRequest) -> Result<Option<InboundRequest>> {
        Ok(Some(InboundRequest {
            peer: PeerAddress::new(vec![0, 1, 2, 3]),
            request,
        }))
    }

    fn mono_request(id: &str, sample_rate: u32) -> AudioRequest {
        let audio = wav_bytes(1, 16_000, &[&[0.1], &[0.2], &[0.3], &[0.2]]);
        AudioRequest::new(id, AudioFormat::Wav, sample_rate, audio)
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn well_formed_request_is_transcribed() {
        let mut h = harness(vec![inbound(mono_request("r1", 16_000))], CountingLoader::default());
        h.service.run().unwrap();

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        let response = &sent[0];
        assert_eq!(response.request_id(), "r1");
        assert!(response.is_success());
        assert_eq!(response.text(), "hello world");
        assert_eq!(response.confidence(), Some(0.97));
        assert_eq!(response.error_details(), None);
        assert!(response.processing_time_ms() >= 0.0);

        assert_eq!(h.loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(staged_files(h.staging.path()), 0);
    }

    #[test]
    fn declared_rate_mismatch_never_reaches_the_engine() {
        let mut h = harness(vec![inbound(mono_request("r1", 44_100))], CountingLoader::default());
        h.service.run().unwrap();

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request_id(), "r1");
        assert!(!sent[0].is_success());
        assert!(sent[0].error_details().unwrap().contains("invalid sample rate"));

        assert_eq!(h.loader.loads.load(Ordering::SeqCst), 0);
        assert_eq!(h.loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(staged_files(h.staging.path()), 0);
    }

    #[test]
    fn invalid_request_is_answered_without_admission() {
        let mut request = mono_request("r7", 16_000);
        request.audio_data.clear();
        let mut h = harness(vec![inbound(request)], CountingLoader::default());
        h.service.run().unwrap();

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request_id(), "r7");
        assert_eq!(
            sent[0].error_details(),
            Some("Request validation failed: audio_data cannot be empty")
        );
        assert_eq!(h.loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn engine_load_failure_is_reported_and_loop_continues() {
        let loader = CountingLoader {
            fail: true,
            ..Default::default()
        };
        let mut h = harness(
            vec![
                inbound(mono_request("a", 16_000)),
                inbound(mono_request("b", 16_000)),
            ],
            loader,
        );
        h.service.run().unwrap();

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 2);
        for response in &sent {
            assert!(response
                .error_details()
                .unwrap()
                .starts_with("Model loading failed"));
        }
        assert!(!h.service.engine().is_loaded());
        assert_eq!(staged_files(h.staging.path()), 0);
    }

    #[test]
    fn malformed_frames_and_send_failures_do_not_stop_the_loop() {
        let mut h = harness(
            vec![
                Err(Error::Decode("not msgpack".to_string())),
                inbound(mono_request("first", 16_000)),
                Ok(None),
                inbound(mono_request("second", 16_000)),
            ],
            CountingLoader::default(),
        );
        *h.sink.failures_left.lock().unwrap() = 1;
        h.service.run().unwrap();

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request_id(), "second");
        assert_eq!(h.loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_stops_the_service_and_releases_resources() {
        let mut h = harness(vec![inbound(mono_request("r1", 16_000))], CountingLoader::default());
        assert_eq!(h.service.state(), ServiceState::Initializing);

        h.service.run().unwrap();

        assert_eq!(h.service.state(), ServiceState::Stopped);
        assert!(h.closed.load(Ordering::SeqCst));
        assert!(!h.service.engine().is_loaded());
        assert_eq!(h.loader.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pending_shutdown_exits_before_receiving() {
        let mut h = harness(vec![inbound(mono_request("r1", 16_000))], CountingLoader::default());
        h.service.shutdown_signal().trigger();

        h.service.run().unwrap();

        assert_eq!(h.service.state(), ServiceState::Stopped);
        assert!(h.sink.sent().is_empty());
    }
}
