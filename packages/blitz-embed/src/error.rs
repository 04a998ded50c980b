use crate::WindowId;

/// Failures surfaced by the embedding layer.
///
/// Structural misuse (duplicate registration, double attachment) and runtime failures
/// (nothing published yet, a fence that never signalled) share one type; callers that only care
/// whether a frame is available use the `Option`-returning convenience methods instead.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EmbedError {
    #[error("window {0} is already registered")]
    DuplicateId(WindowId),

    #[error("window {0} is not registered")]
    NotFound(WindowId),

    #[error("window {0} already has a compositor attached")]
    AlreadyAttached(WindowId),

    #[error("compositor belongs to window {found}, not window {expected}")]
    WindowMismatch { expected: WindowId, found: WindowId },

    #[error("unsupported colour depth {0} (expected 16, 24 or 32)")]
    UnsupportedFormat(u32),

    #[error("no platform image available: {reason}")]
    SurfaceUnavailable { reason: &'static str },

    #[error("failed to publish frame: {0}")]
    PublishFailure(String),

    #[error("window {0} has no compositor attached")]
    NoCompositor(WindowId),

    #[error("snapshot buffer does not fit the requested size and stride")]
    InvalidBuffer,

    #[error("layer compositor failed to draw the snapshot")]
    SnapshotFailed,

    #[error("window registry has been shut down")]
    RegistryShutdown,

    #[error("timed out waiting for the producer's GPU fence")]
    FenceTimeout,

    #[error("graphics context could not be made current")]
    ContextLost,
}

pub type Result<T> = std::result::Result<T, EmbedError>;
