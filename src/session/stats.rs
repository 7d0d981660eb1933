use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::SourceKind;

/// Lifecycle state of the controller's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session
    Inactive,
    Starting,
    Recognizing,
    Stopping,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Inactive)
    }
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// Current session, if any
    pub session_id: Option<String>,

    pub source: Option<SourceKind>,

    /// When the current session started
    pub started_at: Option<DateTime<Utc>>,

    /// Audio frames delivered to the backend in the current session
    pub frames_delivered: u64,

    /// `result` events emitted in the current session
    pub results_emitted: u64,

    /// Sessions completed since the controller started
    pub sessions_completed: u64,
}
