// Shared fixtures for session controller tests
//
// `MockEngine` is both the backend factory and the test's remote control:
// tests call `partial`/`final_result`/`error` on it to play the engine's part.

#![allow(dead_code)]

use anyhow::Result;
use loqa_speech::audio::{
    AudioCapture, AudioFormat, AudioFrame, AudioStreamSource, CaptureError, CaptureFactory,
    DeviceLease,
};
use loqa_speech::recognition::{
    BackendEvents, BackendFactory, Capabilities, RawError, RawResult, RecognitionBackend,
    RecognitionRequest,
};
use loqa_speech::session::{
    ControllerOptions, PermissionCheck, PermissionStatus, RecognitionConfig, SessionController,
    SourceKind,
};
use loqa_speech::{EmittedEvent, SessionEvent};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ============================================================================
// Mock recognition engine
// ============================================================================

#[derive(Default)]
struct EngineState {
    capabilities: Capabilities,
    create_error: Option<RawError>,
    start_error: Option<RawError>,
    start_delay: Option<Duration>,
    /// Final result delivered when the controller asks for a graceful finish
    final_on_finish: Option<RawResult>,

    events: Option<BackendEvents>,
    requests: Vec<RecognitionRequest>,
    created: usize,
    frames_fed: usize,
    finish_calls: usize,
    cancel_calls: usize,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    /// Engine that supports graceful finish but never answers it
    pub fn new() -> Self {
        let engine = Self::default();
        engine.state.lock().unwrap().capabilities = Capabilities {
            graceful_finish: true,
            reads_uri: false,
        };
        engine
    }

    /// Engine with no graceful finish: stopping cancels immediately
    pub fn cancel_only() -> Self {
        Self::default()
    }

    pub fn reading_uris(self) -> Self {
        self.state.lock().unwrap().capabilities.reads_uri = true;
        self
    }

    pub fn finishing_with(self, text: &str) -> Self {
        self.state.lock().unwrap().final_on_finish = Some(transcript(text));
        self
    }

    pub fn failing_create(self, error: RawError) -> Self {
        self.state.lock().unwrap().create_error = Some(error);
        self
    }

    pub fn failing_start(self, error: RawError) -> Self {
        self.state.lock().unwrap().start_error = Some(error);
        self
    }

    pub fn slow_start(self, delay: Duration) -> Self {
        self.state.lock().unwrap().start_delay = Some(delay);
        self
    }

    /// Callback handle of the most recently started session
    pub fn events(&self) -> BackendEvents {
        self.state
            .lock()
            .unwrap()
            .events
            .clone()
            .expect("engine was never started")
    }

    pub fn partial(&self, text: &str) {
        assert!(self.events().partial(transcript(text)));
    }

    pub fn final_result(&self, text: &str) {
        assert!(self.events().final_result(transcript(text)));
    }

    pub fn final_empty(&self) {
        assert!(self.events().final_result(RawResult::Ranked(Vec::new())));
    }

    pub fn error(&self, error: RawError) {
        assert!(self.events().error(error));
    }

    pub fn complete(&self) {
        assert!(self.events().completed());
    }

    pub fn last_request(&self) -> RecognitionRequest {
        self.state
            .lock()
            .unwrap()
            .requests
            .last()
            .cloned()
            .expect("engine was never started")
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn frames_fed(&self) -> usize {
        self.state.lock().unwrap().frames_fed
    }

    pub fn finish_calls(&self) -> usize {
        self.state.lock().unwrap().finish_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.state.lock().unwrap().cancel_calls
    }
}

pub fn transcript(text: &str) -> RawResult {
    RawResult::Transcript {
        text: text.to_string(),
        confidence: Some(0.9),
    }
}

impl BackendFactory for MockEngine {
    fn create(&self, _config: &RecognitionConfig) -> Result<Box<dyn RecognitionBackend>, RawError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.create_error.clone() {
            return Err(error);
        }
        state.created += 1;

        Ok(Box::new(MockBackend {
            engine: self.clone(),
            events: None,
        }))
    }
}

struct MockBackend {
    engine: MockEngine,
    events: Option<BackendEvents>,
}

#[async_trait::async_trait]
impl RecognitionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> Capabilities {
        self.engine.state.lock().unwrap().capabilities
    }

    async fn start(&mut self, request: RecognitionRequest, events: BackendEvents) -> Result<(), RawError> {
        let delay = self.engine.state.lock().unwrap().start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.engine.state.lock().unwrap();
        if let Some(error) = state.start_error.clone() {
            return Err(error);
        }
        state.requests.push(request);
        state.events = Some(events.clone());
        self.events = Some(events);
        Ok(())
    }

    async fn feed(&mut self, _frame: &AudioFrame) -> Result<(), RawError> {
        self.engine.state.lock().unwrap().frames_fed += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), RawError> {
        let final_result = {
            let mut state = self.engine.state.lock().unwrap();
            state.finish_calls += 1;
            state.final_on_finish.clone()
        };

        if let (Some(result), Some(events)) = (final_result, &self.events) {
            events.final_result(result);
        }
        Ok(())
    }

    async fn cancel(&mut self) {
        self.engine.state.lock().unwrap().cancel_calls += 1;
        self.events = None;
    }
}

// ============================================================================
// Mock microphone
// ============================================================================

#[derive(Clone, Default)]
pub struct MockMicrophone {
    frames: Vec<AudioFrame>,
    /// Close the frame channel once the canned frames are queued
    hang_up: bool,
    error: Option<CaptureError>,
    /// Claim the process-wide device lease in `start()`, like the cpal capture
    leasing: bool,
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

impl MockMicrophone {
    /// Microphone that stays open and silent
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_frames(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn hanging_up(mut self) -> Self {
        self.hang_up = true;
        self
    }

    pub fn failing(error: CaptureError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn leasing(mut self) -> Self {
        self.leasing = true;
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl CaptureFactory for MockMicrophone {
    fn create(&self, _format: AudioFormat) -> Result<Box<dyn AudioCapture>, CaptureError> {
        if let Some(error) = self.error.clone() {
            return Err(error);
        }

        Ok(Box::new(MockCapture {
            mic: self.clone(),
            tx: None,
            lease: None,
        }))
    }
}

struct MockCapture {
    mic: MockMicrophone,
    tx: Option<mpsc::Sender<AudioFrame>>,
    lease: Option<DeviceLease>,
}

#[async_trait::async_trait]
impl AudioCapture for MockCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.mic.leasing {
            self.lease = Some(DeviceLease::acquire()?);
        }

        let (tx, rx) = mpsc::channel(self.mic.frames.len().max(1));
        for frame in &self.mic.frames {
            let _ = tx.try_send(frame.clone());
        }
        if !self.mic.hang_up {
            self.tx = Some(tx);
        }

        self.mic.started.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.tx = None;
        self.lease = None;
        self.mic.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "mock microphone"
    }
}

/// 100ms of 16kHz mono audio at a constant level
pub fn frame(level: i16, index: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![level; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: index * 100,
        source: AudioStreamSource::Microphone,
    }
}

// ============================================================================
// Permissions
// ============================================================================

pub struct DenyMicrophone;

#[async_trait::async_trait]
impl PermissionCheck for DenyMicrophone {
    async fn check(&self, source: SourceKind) -> PermissionStatus {
        match source {
            SourceKind::Microphone => PermissionStatus::Denied("Microphone access denied".to_string()),
            SourceKind::File => PermissionStatus::Granted,
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub controller: SessionController,
    pub events: mpsc::UnboundedReceiver<EmittedEvent>,
    pub handle: JoinHandle<()>,
}

pub fn spawn(engine: &MockEngine, mic: &MockMicrophone) -> Harness {
    spawn_with(engine, mic, ControllerOptions::default())
}

pub fn spawn_with(engine: &MockEngine, mic: &MockMicrophone, options: ControllerOptions) -> Harness {
    let (tx, events) = mpsc::unbounded_channel();
    let (controller, handle) = SessionController::builder()
        .options(options)
        .backends(engine.clone())
        .captures(mic.clone())
        .spawn(tx)
        .expect("controller spawns");

    Harness {
        controller,
        events,
        handle,
    }
}

impl Harness {
    /// Receive events up to and including the next `end`
    pub async fn until_end(&mut self) -> Vec<EmittedEvent> {
        let mut collected = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(60), self.events.recv())
                .await
                .expect("timed out waiting for end")
                .expect("event channel closed");
            let done = matches!(event.event, SessionEvent::End);
            collected.push(event);
            if done {
                return collected;
            }
        }
    }

    /// Receive events until one with the given name arrives
    pub async fn until(&mut self, name: &str) -> Vec<EmittedEvent> {
        let mut collected = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(60), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            let done = event.event.name() == name;
            collected.push(event);
            if done {
                return collected;
            }
        }
    }

    /// Anything emitted without waiting
    pub fn drain(&mut self) -> Vec<EmittedEvent> {
        let mut collected = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            collected.push(event);
        }
        collected
    }
}

pub fn names(events: &[EmittedEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event.name()).collect()
}

/// Write a 16-bit mono WAV tone
pub fn write_tone(path: &Path, sample_rate: u32, samples: usize, amplitude: i16) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..samples {
        let sample = if (i / 20) % 2 == 0 { amplitude } else { -amplitude };
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
