// Session state machine
//
// One task owns every piece of session state. Commands from callers, backend
// callbacks, audio frames, and timer deadlines all arrive through the single
// `select!` in `run`, so transitions never interleave. Anything that happens
// after teardown started is dropped: callbacks are tagged with the session
// generation and the session is taken out of the machine before teardown
// emits its closing events.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{RecognitionConfig, SourceKind};
use super::controller::{Command, ControllerOptions};
use super::permissions::{PermissionCheck, PermissionStatus};
use super::stats::{SessionSnapshot, SessionState};
use super::timer::{Deadline, InactivityTimer};
use crate::audio::file::{self, AudioFile};
use crate::audio::{level, AudioCapture, AudioFrame, CaptureFactory, RecordingWriter};
use crate::recognition::normalizer;
use crate::recognition::{
    BackendEvents, BackendFactory, BackendInput, Capabilities, EmittedEvent, ErrorCode,
    ErrorEvent, EventSink, RawCallback, RawError, RawResult, RecognitionBackend,
    RecognitionRequest, SessionEvent,
};

/// Frames buffered between a file feeder and the controller
const FILE_FEED_QUEUE: usize = 8;

struct ActiveSession {
    id: String,
    generation: u64,
    config: RecognitionConfig,
    state: SessionState,
    source: SourceKind,
    /// Effective mode; forced on while a file is playing
    continuous: bool,
    started_at: DateTime<Utc>,

    backend: Box<dyn RecognitionBackend>,
    capabilities: Capabilities,
    capture: Option<Box<dyn AudioCapture>>,
    feeder: Option<JoinHandle<()>>,
    recorder: Option<RecordingWriter>,
    audio_uri: Option<String>,

    sound_detected: bool,
    speech_detected: bool,
    audio_started: bool,
    end_emitted: bool,

    frames_delivered: u64,
    results_emitted: u64,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

/// What `start` resolved before the backend was started
enum PreparedSource {
    Microphone(Box<dyn AudioCapture>),
    Stream(AudioFile, file::FileFeedConfig, String),
    Handoff(String),
}

/// Audio wired into the session once the backend is ready
enum AudioInput {
    Live(Box<dyn AudioCapture>, mpsc::Receiver<AudioFrame>),
    Stream(AudioFile, file::FileFeedConfig, String),
    Handoff(String),
}

pub(crate) struct Machine {
    options: ControllerOptions,
    backends: Arc<dyn BackendFactory>,
    captures: Arc<dyn CaptureFactory>,
    permissions: Arc<dyn PermissionCheck>,
    sink: Box<dyn EventSink>,
    commands: mpsc::WeakUnboundedSender<Command>,

    generation: u64,
    sessions_completed: u64,
    session: Option<ActiveSession>,

    // Polled by `run`; kept outside `ActiveSession` so the select arms borrow disjoint fields
    frames: Option<mpsc::Receiver<AudioFrame>>,
    inactivity: InactivityTimer,
    finish_timer: Deadline,
}

fn emit_to(sink: &dyn EventSink, session_id: &str, event: SessionEvent) {
    debug!("[{}] {}", session_id, event.name());
    sink.emit(EmittedEvent {
        session_id: session_id.to_string(),
        emitted_at: Utc::now(),
        event,
    });
}

async fn next_frame(frames: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Controller loop: runs until shut down or every handle is dropped
pub(crate) async fn run(mut machine: Machine, mut commands: mpsc::UnboundedReceiver<Command>) {
    info!("Session controller started");

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => machine.handle_command(command).await,
            },
            frame = next_frame(&mut machine.frames) => machine.on_frame(frame).await,
            () = machine.inactivity.fired() => machine.on_inactivity().await,
            () = machine.finish_timer.fired() => machine.on_finish_timeout().await,
        }
    }

    if machine.session.is_some() {
        info!("Session controller shutting down, aborting active session");
        machine.teardown().await;
    }

    info!("Session controller stopped");
}

impl Machine {
    pub(crate) fn new(
        options: ControllerOptions,
        backends: Arc<dyn BackendFactory>,
        captures: Arc<dyn CaptureFactory>,
        permissions: Arc<dyn PermissionCheck>,
        sink: Box<dyn EventSink>,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let inactivity = InactivityTimer::new(options.inactivity_timeout);
        let finish_timer = Deadline::new(options.finish_timeout);

        Self {
            options,
            backends,
            captures,
            permissions,
            sink,
            commands,
            generation: 0,
            sessions_completed: 0,
            session: None,
            frames: None,
            inactivity,
            finish_timer,
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { config, reply } => {
                self.start_session(config).await;
                let _ = reply.send(());
            }
            Command::Stop { reply } => self.stop_session(reply).await,
            Command::Abort => {
                let Some(id) = self.session.as_ref().map(|s| s.id.clone()) else {
                    return;
                };
                info!("Aborting session {}", id);
                self.teardown().await;
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Backend {
                generation,
                callback,
            } => {
                let current = self.session.as_ref().map(|s| s.generation) == Some(generation);
                if current {
                    self.on_callback(callback).await;
                } else {
                    debug!("Ignoring stale backend callback (generation {})", generation);
                }
            }
            // Handled by the loop
            Command::Shutdown => {}
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        match &self.session {
            Some(session) => SessionSnapshot {
                state: session.state,
                session_id: Some(session.id.clone()),
                source: Some(session.source),
                started_at: Some(session.started_at),
                frames_delivered: session.frames_delivered,
                results_emitted: session.results_emitted,
                sessions_completed: self.sessions_completed,
            },
            None => SessionSnapshot {
                state: SessionState::Inactive,
                session_id: None,
                source: None,
                started_at: None,
                frames_delivered: 0,
                results_emitted: 0,
                sessions_completed: self.sessions_completed,
            },
        }
    }

    // ------------------------------------------------------------------
    // Idle -> Starting -> Recognizing
    // ------------------------------------------------------------------

    async fn start_session(&mut self, config: RecognitionConfig) {
        if let Some(previous) = self.session.as_ref().map(|s| s.id.clone()) {
            info!("Preempting session {} for a new start", previous);
            self.teardown().await;
        }

        self.generation += 1;
        let generation = self.generation;
        let session_id = format!("session-{}", uuid::Uuid::new_v4());
        let source = config.source_kind();

        info!(
            "Starting recognition session {} ({:?} source, lang={}, continuous={}, interim={})",
            session_id, source, config.lang, config.continuous, config.interim_results
        );

        if let Err(e) = config.validate() {
            self.fail_start(&session_id, ErrorEvent::new(ErrorCode::Client, e.to_string()));
            return;
        }

        if let PermissionStatus::Denied(reason) = self.permissions.check(source).await {
            self.fail_start(&session_id, ErrorEvent::new(ErrorCode::NotAllowed, reason));
            return;
        }

        let mut backend = match self.backends.create(&config) {
            Ok(backend) => backend,
            Err(raw) => {
                self.fail_start(&session_id, normalizer::normalize_error(&raw));
                return;
            }
        };
        let capabilities = backend.capabilities();

        let prepared = match self.prepare_source(&config, capabilities) {
            Ok(prepared) => prepared,
            Err(error) => {
                backend.cancel().await;
                self.fail_start(&session_id, error);
                return;
            }
        };

        let input = match &prepared {
            PreparedSource::Handoff(uri) => BackendInput::Uri(uri.clone()),
            PreparedSource::Stream(_, feed, _) => BackendInput::Stream {
                sample_rate: feed.target_sample_rate,
                channels: feed.target_channels,
            },
            PreparedSource::Microphone(_) => {
                let format = config.capture_format();
                BackendInput::Stream {
                    sample_rate: format.sample_rate,
                    channels: format.channels,
                }
            }
        };

        let Some(tx) = self.commands.upgrade() else {
            warn!("Session controller is shutting down, refusing to start {}", session_id);
            backend.cancel().await;
            return;
        };
        let events = BackendEvents::new(tx, generation);
        let request = RecognitionRequest {
            session_id: session_id.clone(),
            config: config.clone(),
            input,
        };

        info!("Waiting for backend {} to become ready", backend.name());
        let ready = tokio::time::timeout(self.options.start_timeout, backend.start(request, events)).await;
        let failure = match ready {
            Ok(Ok(())) => None,
            Ok(Err(raw)) => Some(raw),
            Err(_) => Some(RawError::Timeout(format!(
                "Backend {} was not ready within {}ms",
                backend.name(),
                self.options.start_timeout.as_millis()
            ))),
        };
        if let Some(raw) = failure {
            backend.cancel().await;
            self.fail_start(&session_id, normalizer::normalize_error(&raw));
            return;
        }

        // The device is claimed before `start`, so a busy microphone never gets one
        let audio = match prepared {
            PreparedSource::Microphone(mut capture) => match capture.start().await {
                Ok(rx) => AudioInput::Live(capture, rx),
                Err(e) => {
                    backend.cancel().await;
                    self.fail_start(&session_id, normalizer::normalize_error(&RawError::Capture(e)));
                    return;
                }
            },
            PreparedSource::Stream(audio_file, feed, uri) => AudioInput::Stream(audio_file, feed, uri),
            PreparedSource::Handoff(uri) => AudioInput::Handoff(uri),
        };

        let continuous = config.continuous || source == SourceKind::File;
        let recording_path = config.persists_audio().then(|| {
            config
                .recording_options
                .as_ref()
                .and_then(|r| r.output_path.clone())
                .unwrap_or_else(|| self.options.recordings_dir.join(format!("{}.wav", session_id)))
        });

        self.session = Some(ActiveSession {
            id: session_id.clone(),
            generation,
            config,
            state: SessionState::Starting,
            source,
            continuous,
            started_at: Utc::now(),
            backend,
            capabilities,
            capture: None,
            feeder: None,
            recorder: None,
            audio_uri: None,
            sound_detected: false,
            speech_detected: false,
            audio_started: false,
            end_emitted: false,
            frames_delivered: 0,
            results_emitted: 0,
            stop_waiters: Vec::new(),
        });

        emit_to(self.sink.as_ref(), &session_id, SessionEvent::Start);
        if let Some(session) = self.session.as_mut() {
            session.state = SessionState::Recognizing;
        }

        self.begin_audio(audio, recording_path);

        if !continuous {
            self.inactivity.restart();
        }

        info!("Session {} is recognizing", session_id);
    }

    /// Resolve the audio source before anything is emitted
    fn prepare_source(
        &self,
        config: &RecognitionConfig,
        capabilities: Capabilities,
    ) -> Result<PreparedSource, ErrorEvent> {
        match &config.audio_source {
            Some(source) if capabilities.reads_uri => Ok(PreparedSource::Handoff(source.uri.clone())),
            Some(source) => {
                let path = file::resolve_uri(&source.uri)
                    .map_err(|e| normalizer::normalize_error(&RawError::Capture(e)))?;
                let audio = AudioFile::open(&path).map_err(|e| {
                    ErrorEvent::new(
                        ErrorCode::AudioCapture,
                        format!("Failed to open audio source {}: {:#}", source.uri, e),
                    )
                })?;
                Ok(PreparedSource::Stream(audio, source.feed_config(), source.uri.clone()))
            }
            None => self
                .captures
                .create(config.capture_format())
                .map(PreparedSource::Microphone)
                .map_err(|e| normalizer::normalize_error(&RawError::Capture(e))),
        }
    }

    /// Hook up the running capture or the file feed and emit `audiostart`
    fn begin_audio(&mut self, audio: AudioInput, recording_path: Option<std::path::PathBuf>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match audio {
            AudioInput::Live(capture, rx) => {
                info!("Capturing from {}", capture.name());
                self.frames = Some(rx);
                session.capture = Some(capture);

                if let Some(path) = recording_path {
                    let format = session.config.capture_format();
                    match RecordingWriter::create(&path, format.sample_rate, format.channels) {
                        Ok(writer) => {
                            session.audio_uri = Some(writer.path().display().to_string());
                            session.recorder = Some(writer);
                        }
                        Err(e) => warn!("Recording disabled for {}: {:#}", session.id, e),
                    }
                }
            }
            AudioInput::Stream(audio_file, feed, uri) => {
                let (tx, rx) = mpsc::channel(FILE_FEED_QUEUE);
                session.feeder = Some(file::spawn_feeder(audio_file, feed, tx));
                session.audio_uri = Some(uri);
                self.frames = Some(rx);
            }
            AudioInput::Handoff(uri) => {
                info!("Backend {} reads {} directly", session.backend.name(), uri);
                session.audio_uri = Some(uri);
            }
        }

        session.audio_started = true;
        emit_to(
            self.sink.as_ref(),
            &session.id,
            SessionEvent::AudioStart {
                uri: session.audio_uri.clone(),
            },
        );
    }

    /// Construction failed: report it and end without ever emitting `start`
    fn fail_start(&mut self, session_id: &str, error: ErrorEvent) {
        error!("Session {} failed to start: {}", session_id, error);
        emit_to(self.sink.as_ref(), session_id, SessionEvent::Error(error));
        emit_to(self.sink.as_ref(), session_id, SessionEvent::End);
        self.sessions_completed += 1;
    }

    // ------------------------------------------------------------------
    // Recognizing
    // ------------------------------------------------------------------

    async fn on_frame(&mut self, frame: Option<AudioFrame>) {
        let Some(frame) = frame else {
            self.frames = None;
            self.on_audio_exhausted().await;
            return;
        };

        let threshold = self.options.activity_threshold;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(recorder) = session.recorder.as_mut() {
            if let Err(e) = recorder.write_frame(&frame) {
                warn!("Stopping recording for {}: {:#}", session.id, e);
                session.recorder = None;
            }
        }

        if !session.sound_detected && level::has_activity(&frame.samples, threshold) {
            session.sound_detected = true;
            emit_to(self.sink.as_ref(), &session.id, SessionEvent::SoundStart);
        }

        let fed = session.backend.feed(&frame).await;
        match fed {
            Ok(()) => session.frames_delivered += 1,
            Err(raw) => {
                let error = normalizer::normalize_error(&raw);
                self.fail_session(error).await;
            }
        }
    }

    /// The frame channel closed: file playback finished or the microphone went away
    async fn on_audio_exhausted(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != SessionState::Recognizing {
            return;
        }

        match session.source {
            SourceKind::File => {
                info!("Playback finished for {}, requesting final result", session.id);
                session.continuous = session.config.continuous;
                self.finish_gracefully().await;
            }
            SourceKind::Microphone => {
                self.fail_session(ErrorEvent::new(
                    ErrorCode::AudioCapture,
                    "Microphone stream ended unexpectedly",
                ))
                .await;
            }
        }
    }

    async fn on_callback(&mut self, callback: RawCallback) {
        match callback {
            RawCallback::SoundActivity => {
                if let Some(session) = self.session.as_mut() {
                    if !session.sound_detected {
                        session.sound_detected = true;
                        emit_to(self.sink.as_ref(), &session.id, SessionEvent::SoundStart);
                    }
                }
            }
            RawCallback::Partial(raw) => self.on_result(raw, false).await,
            RawCallback::Final(raw) => self.on_result(raw, true).await,
            RawCallback::Error(raw) => {
                let error = normalizer::normalize_error(&raw);
                self.fail_session(error).await;
            }
            RawCallback::Completed => {
                if let Some(id) = self.session.as_ref().map(|s| s.id.as_str()) {
                    info!("Backend completed session {}", id);
                }
                self.teardown().await;
            }
        }
    }

    async fn on_result(&mut self, raw: RawResult, is_final: bool) {
        let sink = self.sink.as_ref();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let result = normalizer::normalize_result(&raw, is_final, session.config.max_alternatives);

        // A result means the engine heard something
        if !session.sound_detected {
            session.sound_detected = true;
            emit_to(sink, &session.id, SessionEvent::SoundStart);
        }
        if !session.speech_detected && !result.is_empty() {
            session.speech_detected = true;
            emit_to(sink, &session.id, SessionEvent::SpeechStart);
        }

        if is_final && result.is_empty() {
            debug!("Final result for {} carried no alternatives", session.id);
            emit_to(sink, &session.id, SessionEvent::NoMatch);
        } else if let Some(result) = normalizer::filter_interim(result, session.config.interim_results) {
            session.results_emitted += 1;
            emit_to(sink, &session.id, SessionEvent::Result(result));
        }

        let finishing = session.state == SessionState::Stopping;
        let continuous = session.continuous;

        if is_final && (finishing || !continuous) {
            self.teardown().await;
        } else if !continuous && !finishing {
            self.inactivity.restart();
        }
    }

    async fn on_inactivity(&mut self) {
        if let Some(session) = &self.session {
            info!(
                "No recognition activity for {}ms in session {}, finishing",
                self.inactivity.timeout().as_millis(),
                session.id
            );
        }
        self.finish_gracefully().await;
    }

    async fn on_finish_timeout(&mut self) {
        if let Some(session) = &self.session {
            warn!(
                "Backend {} sent no final result within {}ms, tearing down {}",
                session.backend.name(),
                self.finish_timer.timeout().as_millis(),
                session.id
            );
        }
        self.teardown().await;
    }

    // ------------------------------------------------------------------
    // Recognizing -> Stopping -> Idle
    // ------------------------------------------------------------------

    async fn stop_session(&mut self, reply: oneshot::Sender<()>) {
        let Some(session) = self.session.as_mut() else {
            debug!("Stop requested with no active session");
            let _ = reply.send(());
            return;
        };

        session.stop_waiters.push(reply);
        if session.state == SessionState::Stopping {
            debug!("Session {} is already stopping", session.id);
            return;
        }

        info!("Stopping session {}", session.id);
        self.finish_gracefully().await;
    }

    /// Ask the backend for its final result, or tear down if it cannot finish gracefully
    async fn finish_gracefully(&mut self) {
        self.inactivity.cancel();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !matches!(session.state, SessionState::Starting | SessionState::Recognizing) {
            return;
        }

        if !session.capabilities.graceful_finish {
            debug!("Backend {} cannot finish gracefully, cancelling", session.backend.name());
            self.teardown().await;
            return;
        }

        session.state = SessionState::Stopping;

        // No more audio once the engine is finalizing
        self.frames = None;
        if let Some(mut capture) = session.capture.take() {
            if let Err(e) = capture.stop().await {
                error!("Failed to stop audio capture: {}", e);
            }
        }
        if let Some(feeder) = session.feeder.take() {
            feeder.abort();
        }

        let finished = session.backend.finish().await;
        if let Err(raw) = finished {
            let error = normalizer::normalize_error(&raw);
            self.fail_session(error).await;
            return;
        }

        self.finish_timer.restart();
    }

    async fn fail_session(&mut self, error: ErrorEvent) {
        let Some(id) = self.session.as_ref().map(|s| s.id.clone()) else {
            return;
        };

        error!("Session {} failed: {}", id, error);
        emit_to(self.sink.as_ref(), &id, SessionEvent::Error(error));
        self.teardown().await;
    }

    /// Release everything and emit the closing events
    ///
    /// The session leaves the machine first, so nothing observed during the
    /// awaits below can emit into it.
    async fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.state = SessionState::Stopping;
        self.inactivity.cancel();
        self.finish_timer.cancel();
        self.frames = None;

        if let Some(mut capture) = session.capture.take() {
            if let Err(e) = capture.stop().await {
                error!("Failed to stop audio capture: {}", e);
            }
        }
        if let Some(feeder) = session.feeder.take() {
            feeder.abort();
        }
        session.backend.cancel().await;

        if let Some(recorder) = session.recorder.take() {
            if let Err(e) = recorder.finish() {
                error!("Failed to finalize recording for {}: {:#}", session.id, e);
            }
        }

        let sink = self.sink.as_ref();
        if session.speech_detected {
            emit_to(sink, &session.id, SessionEvent::SpeechEnd);
        }
        if session.sound_detected {
            emit_to(sink, &session.id, SessionEvent::SoundEnd);
        }
        if session.audio_started {
            emit_to(
                sink,
                &session.id,
                SessionEvent::AudioEnd {
                    uri: session.audio_uri.clone(),
                },
            );
        }
        if !session.end_emitted {
            session.end_emitted = true;
            emit_to(sink, &session.id, SessionEvent::End);
        }

        self.sessions_completed += 1;
        for waiter in session.stop_waiters.drain(..) {
            let _ = waiter.send(());
        }

        info!(
            "Session {} ended ({} frames, {} results)",
            session.id, session.frames_delivered, session.results_emitted
        );
    }
}
