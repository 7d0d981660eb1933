use super::config::SourceKind;

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied(String),
}

/// Host hook deciding whether a session may use its audio source
///
/// Runs before any backend is constructed; a denial ends the session with a
/// `not-allowed` error and no `start` event.
#[async_trait::async_trait]
pub trait PermissionCheck: Send + Sync {
    async fn check(&self, source: SourceKind) -> PermissionStatus;
}

/// Grants every request (headless hosts with no permission model)
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait::async_trait]
impl PermissionCheck for AllowAll {
    async fn check(&self, _source: SourceKind) -> PermissionStatus {
        PermissionStatus::Granted
    }
}
