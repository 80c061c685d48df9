//! End-to-end tests over in-process ZeroMQ endpoints.

use std::io::Cursor;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use stt_core::{
    AudioFormat, AudioRequest, EngineLoader, Error, RequestSender, RequestSource, Result,
    SpeechModel, SttClient, SttConfig, SttService, Transcript, ZmqInbound, ZmqOutbound,
};

struct StubLoader;

struct StubModel;

impl EngineLoader for StubLoader {
    fn load(&self) -> Result<Box<dyn SpeechModel>> {
        Ok(Box::new(StubModel))
    }
}

impl SpeechModel for StubModel {
    fn transcribe(&mut self, audio_path: &Path) -> Result<Transcript> {
        assert!(audio_path.exists(), "staged audio must exist during inference");
        Ok(Transcript::new("hello world", Some(0.97)))
    }
}

fn mono_wav(sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for i in 0..1600 {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 440.0 * std::f32::consts::TAU).sin() * 0.3;
            writer.write_sample((sample * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

#[test]
fn inbound_receives_request_with_peer_identity() {
    let context = zmq::Context::new();
    let mut inbound = ZmqInbound::bind(&context, "inproc://bridge-inbound").unwrap();
    let sender = RequestSender::connect_with(&context, "inproc://bridge-inbound").unwrap();

    let request = AudioRequest::new("r1", AudioFormat::Wav, 16_000, mono_wav(16_000));
    sender.send(&request).unwrap();

    let received = inbound
        .receive(Duration::from_secs(5))
        .unwrap()
        .expect("request should arrive");
    assert_eq!(received.request, request);
    assert!(!received.peer.as_bytes().is_empty());
}

#[test]
fn inbound_times_out_when_idle() {
    let context = zmq::Context::new();
    let mut inbound = ZmqInbound::bind(&context, "inproc://bridge-idle").unwrap();
    assert!(inbound.receive(Duration::from_millis(20)).unwrap().is_none());
}

#[test]
fn malformed_payload_is_a_decode_error() {
    let context = zmq::Context::new();
    let mut inbound = ZmqInbound::bind(&context, "inproc://bridge-malformed").unwrap();
    let sender = RequestSender::connect_with(&context, "inproc://bridge-malformed").unwrap();

    sender.send_raw(b"\xc1 definitely not msgpack").unwrap();

    let err = inbound.receive(Duration::from_secs(5)).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn service_relays_transcriptions_downstream() {
    let context = zmq::Context::new();
    let staging = tempfile::tempdir().unwrap();

    let mut client = SttClient::with_context(context.clone(), "inproc://service-out");
    client.connect().unwrap();

    let config = SttConfig {
        input_address: "inproc://service-in".to_string(),
        output_address: "inproc://service-out".to_string(),
        staging_dir: Some(staging.path().to_path_buf()),
        poll_interval_ms: 10,
        ..SttConfig::default()
    };
    let inbound = ZmqInbound::bind(&context, &config.input_address).unwrap();
    let outbound = ZmqOutbound::connect(&context, &config.output_address).unwrap();
    let mut service = SttService::new(inbound, outbound, &config, Box::new(StubLoader));
    let shutdown = service.shutdown_signal();
    let worker = thread::spawn(move || {
        service.run().unwrap();
        service.state()
    });

    let sender = RequestSender::connect_with(&context, "inproc://service-in").unwrap();
    sender
        .send(&AudioRequest::new("r1", AudioFormat::Wav, 16_000, mono_wav(16_000)))
        .unwrap();
    sender
        .send(&AudioRequest::new("r2", AudioFormat::Wav, 44_100, mono_wav(44_100)))
        .unwrap();

    let first = client
        .receive(Duration::from_secs(10))
        .unwrap()
        .expect("first response");
    assert_eq!(first.request_id(), "r1");
    assert!(first.is_success());
    assert_eq!(first.text(), "hello world");
    assert_eq!(first.confidence(), Some(0.97));

    let second = client
        .receive(Duration::from_secs(10))
        .unwrap()
        .expect("second response");
    assert_eq!(second.request_id(), "r2");
    assert!(!second.is_success());
    assert!(second.error_details().unwrap().contains("invalid sample rate"));

    shutdown.trigger();
    assert_eq!(worker.join().unwrap(), stt_core::ServiceState::Stopped);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test]
fn idle_service_stops_within_a_poll_interval() {
    let context = zmq::Context::new();
    let config = SttConfig {
        input_address: "inproc://idle-service-in".to_string(),
        output_address: "inproc://idle-service-out".to_string(),
        poll_interval_ms: 250,
        ..SttConfig::default()
    };
    let poll_interval = config.poll_interval();
    let inbound = ZmqInbound::bind(&context, &config.input_address).unwrap();
    let outbound = ZmqOutbound::connect(&context, &config.output_address).unwrap();
    let mut service = SttService::new(inbound, outbound, &config, Box::new(StubLoader));
    let shutdown = service.shutdown_signal();

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let worker = thread::spawn(move || {
        let result = service.run();
        done_tx.send(Instant::now()).unwrap();
        (result, service.state())
    });

    // Let the loop settle into idle polling.
    thread::sleep(poll_interval * 2);
    let triggered = Instant::now();
    shutdown.trigger();

    let finished = done_rx
        .recv_timeout(poll_interval * 4)
        .expect("service should stop promptly");
    assert!(
        finished.duration_since(triggered) <= poll_interval * 2,
        "stopped after {:?}",
        finished.duration_since(triggered)
    );

    let (result, state) = worker.join().unwrap();
    result.unwrap();
    assert_eq!(state, stt_core::ServiceState::Stopped);
}

#[test]
fn client_listen_stops_on_request() {
    let context = zmq::Context::new();
    let mut client = SttClient::with_context(context.clone(), "inproc://listen-out");
    client.connect().unwrap();

    let mut outbound = ZmqOutbound::connect(&context, "inproc://listen-out").unwrap();
    let stop = client.stop_handle();

    let producer = thread::spawn(move || {
        use stt_core::{ResponseSink, TranscriptionResponse};
        outbound
            .send(&TranscriptionResponse::success("a", "one", None, 1.0))
            .unwrap();
        outbound
            .send(&TranscriptionResponse::error("b", "Transcription failed: boom", 2.0))
            .unwrap();
        thread::sleep(Duration::from_millis(300));
        stop.stop();
    });

    let mut seen = Vec::new();
    client
        .listen(
            |response| {
                seen.push(response.request_id().to_string());
                if response.is_success() {
                    Ok(())
                } else {
                    Err("callback rejected error response")
                }
            },
            Duration::from_millis(20),
        )
        .unwrap();
    producer.join().unwrap();

    assert_eq!(seen, ["a", "b"]);
}
