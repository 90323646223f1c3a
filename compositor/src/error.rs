//! Runtime error types for the compositing manager.
//!
//! Every variant here is tagged in its doc comment with the error kind it
//! implements and that kind's propagation policy: startup errors bubble up
//! to `main` and abort with a non-zero exit code; runtime errors are logged
//! and swallowed at the event handler that received them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompositorError {
    /// *transport-lost*: fatal on any poll.
    #[error("lost connection to the display server: {0}")]
    TransportLost(#[from] x11rb::errors::ConnectionError),

    /// *extension-missing*: fatal at startup only.
    #[error("required X11 extension missing or too old: {0}")]
    ExtensionMissing(String),

    /// *selection-conflict*: fatal at startup only.
    #[error("another compositing manager is running")]
    SelectionConflict,

    /// *backend-init-failure*: fatal at startup; logged at warn and retried at runtime.
    #[error("rendering backend failed to initialize: {0}")]
    BackendInitFailure(String),

    /// Wraps a reply error: *resource-vanished* when it names a stale id,
    /// otherwise a generic protocol error.
    #[error("X11 request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error("X11 reply-or-id error: {0}")]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("configuration error: {0}")]
    Config(#[from] compman_core::CoreError),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CompositorError>;

/// Classifies an X11 protocol error for the *resource-vanished* policy:
/// true when the error indicates the referenced resource (window, pixmap,
/// drawable, damage object...) no longer exists, which the caller should
/// log at debug and otherwise ignore rather than treat as fatal.
pub fn is_resource_vanished(error: &x11rb::x11_utils::X11Error) -> bool {
    use x11rb::protocol::ErrorKind;
    matches!(
        error.error_kind,
        ErrorKind::Window | ErrorKind::Drawable | ErrorKind::Pixmap | ErrorKind::IDChoice
    )
}
