use thiserror::Error;

/// Errors that can occur while driving a simulated charging session
#[derive(Error, Debug)]
pub enum SimError {
    /// A simulation is already in progress on this supervisor
    #[error("A simulation is already in progress")]
    AlreadyRunning,

    /// No device handle is bound
    #[error("No active M18 connection")]
    NoConnection,

    /// Session duration is not a positive number of seconds
    #[error("Invalid duration {seconds}: please enter a positive number of seconds")]
    InvalidDuration {
        /// Rejected duration value as typed or passed
        seconds: String,
    },

    /// Profile selection could not be resolved
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// Device rejected or garbled a protocol exchange
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serial transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device handle is no longer connected
    #[error("Device disconnected")]
    Disconnected,

    /// Protocol call timed out
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Background worker panicked or was aborted before reporting
    #[error("Simulation worker failed: {0}")]
    WorkerFailed(String),
}

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    /// Check if this error is a synchronous start rejection
    ///
    /// Start rejections are the only errors a caller of
    /// [`SessionSupervisor::start`](crate::SessionSupervisor::start) ever sees;
    /// everything that happens after a session is accepted is reported as an event.
    #[must_use]
    pub const fn is_start_rejection(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning
                | Self::NoConnection
                | Self::InvalidDuration { .. }
                | Self::InvalidProfile(_)
        )
    }

    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NoConnection | Self::Disconnected | Self::Transport(_) | Self::Io(_)
        )
    }

    /// Check if the operator can fix this by correcting input and retrying
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning
                | Self::Timeout { .. }
                | Self::InvalidDuration { .. }
                | Self::InvalidProfile(_)
        )
    }
}
