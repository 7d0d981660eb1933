use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use super::config::RecognitionConfig;
use super::machine::{self, Machine};
use super::permissions::{AllowAll, PermissionCheck};
use super::stats::{SessionSnapshot, SessionState};
use super::timer::DEFAULT_INACTIVITY_TIMEOUT;
use crate::audio::{CaptureFactory, MicrophoneFactory};
use crate::recognition::{BackendFactory, EventSink, RawCallback};

/// Everything the controller loop consumes, in arrival order
pub(crate) enum Command {
    Start {
        config: RecognitionConfig,
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Abort,
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Backend {
        generation: u64,
        callback: RawCallback,
    },
    Shutdown,
}

/// Timing and policy knobs for the controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Auto-stop after this long without a recognition update (non-continuous sessions)
    pub inactivity_timeout: Duration,

    /// How long `stop()` waits for the backend's final result before tearing down anyway
    pub finish_timeout: Duration,

    /// How long the backend may take to become ready
    pub start_timeout: Duration,

    /// RMS level (0.0 to 1.0) at which a frame counts as sound
    pub activity_threshold: f32,

    /// Directory for persisted recordings without an explicit output path
    pub recordings_dir: PathBuf,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            finish_timeout: Duration::from_secs(5),
            start_timeout: Duration::from_secs(10),
            activity_threshold: 0.02,
            recordings_dir: PathBuf::from("recordings"),
        }
    }
}

/// Handle to a running session controller
///
/// All handles talk to one controller task that owns the session. Dropping
/// every handle shuts the controller down once the current session ends.
#[derive(Clone)]
pub struct SessionController {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionController {
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::default()
    }

    /// Start a new session, tearing down any session that is still running
    ///
    /// Resolves once the session is recognizing or has failed to start; the
    /// outcome is reported through the event sink.
    pub async fn start(&self, config: RecognitionConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { config, reply })?;
        rx.await.context("Session controller dropped start request")
    }

    /// Stop gracefully, waiting for the backend's final result
    ///
    /// Resolves once the session has emitted `end`. Calling it with no session
    /// running is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.context("Session controller dropped stop request")
    }

    /// Cancel the current session immediately, discarding pending results
    pub fn abort(&self) {
        let _ = self.send(Command::Abort);
    }

    pub async fn state(&self) -> Result<SessionState> {
        Ok(self.snapshot().await?.state)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.context("Session controller dropped state request")
    }

    /// Abort any session and stop the controller task
    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("Session controller is not running"))
    }
}

/// Wires backends, audio capture, and permissions into a controller
pub struct SessionControllerBuilder {
    options: ControllerOptions,
    backends: Option<Arc<dyn BackendFactory>>,
    captures: Arc<dyn CaptureFactory>,
    permissions: Arc<dyn PermissionCheck>,
}

impl Default for SessionControllerBuilder {
    fn default() -> Self {
        Self {
            options: ControllerOptions::default(),
            backends: None,
            captures: Arc::new(MicrophoneFactory::default()),
            permissions: Arc::new(AllowAll),
        }
    }
}

impl SessionControllerBuilder {
    pub fn options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backends(mut self, factory: impl BackendFactory + 'static) -> Self {
        self.backends = Some(Arc::new(factory));
        self
    }

    pub fn captures(mut self, factory: impl CaptureFactory + 'static) -> Self {
        self.captures = Arc::new(factory);
        self
    }

    pub fn permissions(mut self, check: impl PermissionCheck + 'static) -> Self {
        self.permissions = Arc::new(check);
        self
    }

    /// Spawn the controller task on the current Tokio runtime
    pub fn spawn(self, sink: impl EventSink + 'static) -> Result<(SessionController, JoinHandle<()>)> {
        let backends = self
            .backends
            .context("A recognition backend factory is required")?;

        let (tx, rx) = mpsc::unbounded_channel();

        let machine = Machine::new(
            self.options,
            backends,
            self.captures,
            self.permissions,
            Box::new(sink),
            tx.downgrade(),
        );

        info!("Spawning session controller");
        let handle = tokio::spawn(machine::run(machine, rx));

        Ok((SessionController { tx }, handle))
    }
}
