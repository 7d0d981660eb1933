use std::time::Duration;
use tokio::time::Instant;

/// Default time to wait for the next recognition update in non-continuous mode
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Single-shot restartable countdown polled from the controller loop
///
/// The timer is plain data owned by the controller: `fired()` only completes
/// while it is armed, so once `cancel()` returns no firing can be observed.
/// The controller keeps two, one for inactivity and one bounding the graceful finish.
#[derive(Debug)]
pub struct Deadline {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm the timer for a full timeout from now, replacing any pending deadline
    pub fn restart(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes when the deadline passes; pending forever while disarmed
    ///
    /// Disarms itself on firing.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new(DEFAULT_INACTIVITY_TIMEOUT)
    }
}

/// The deadline that ends a quiet non-continuous session
pub type InactivityTimer = Deadline;
