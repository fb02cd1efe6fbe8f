use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use uuid::Uuid;

use crate::error::SimError;

/// Raw device units per ampere
pub const RAW_UNITS_PER_AMP: f64 = 1000.0;

/// Cutoff/max current pair in raw device units
///
/// One raw unit is roughly one milliampere. The amps view is derived and never
/// stored, so both representations always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChargerProfile {
    /// Current below which charging is considered complete
    pub cutoff_raw: u32,
    /// Charging current ceiling
    pub max_raw: u32,
}

impl ChargerProfile {
    /// Create a new profile from raw values
    #[must_use]
    pub const fn new(cutoff_raw: u32, max_raw: u32) -> Self {
        Self {
            cutoff_raw,
            max_raw,
        }
    }

    /// Cutoff current in amps
    #[must_use]
    pub fn cutoff_amps(&self) -> f64 {
        f64::from(self.cutoff_raw) / RAW_UNITS_PER_AMP
    }

    /// Max current in amps
    #[must_use]
    pub fn max_amps(&self) -> f64 {
        f64::from(self.max_raw) / RAW_UNITS_PER_AMP
    }

    /// Whether the cutoff sits above the max current
    ///
    /// Such a pair is still forwarded to the device unchanged.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.cutoff_raw > self.max_raw
    }
}

impl fmt::Display for ChargerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cutoff {} ({:.2} A), max {} ({:.2} A)",
            self.cutoff_raw,
            self.cutoff_amps(),
            self.max_raw,
            self.max_amps()
        )
    }
}

/// Profile chosen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileSelection {
    /// Low current, low cutoff
    Gentle,
    /// Default charger behaviour
    Normal,
    /// High current
    Aggressive,
    /// Operator-edited values
    Custom,
}

impl ProfileSelection {
    /// All selections in display order
    pub const ALL: [Self; 4] = [Self::Gentle, Self::Normal, Self::Aggressive, Self::Custom];

    /// Operator-facing label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gentle => "Gentle",
            Self::Normal => "Normal",
            Self::Aggressive => "Aggressive",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for ProfileSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProfileSelection {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        Self::ALL
            .into_iter()
            .find(|selection| selection.label() == label)
            .ok_or_else(|| SimError::InvalidProfile(format!("unknown profile '{label}'")))
    }
}

/// Session tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pause between the pre-charge snapshot and the first keepalive, in milliseconds
    pub settle_delay_ms: u64,
    /// Configure code announcing the pre-charge phase
    pub precharge_mode: u8,
    /// Configure code announcing the active charging phase
    pub active_mode: u8,
    /// Keepalive interval used for unrecognized baud tokens, in milliseconds
    pub default_interval_ms: u64,
    /// Upper bound for custom raw values
    pub custom_limit_raw: u32,
}

impl SessionConfig {
    /// Settle delay as a [`Duration`]
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 600,
            precharge_mode: 2,
            active_mode: 1,
            default_interval_ms: 500,
            custom_limit_raw: 20_000,
        }
    }
}

/// Stage of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStage {
    /// Limits are being swapped in
    Init,
    /// Reset and configure handshake
    Negotiating,
    /// Steady keepalive loop
    Running,
    /// Idle and restore
    Finalizing,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Negotiating => write!(f, "Negotiating"),
            Self::Running => write!(f, "Running"),
            Self::Finalizing => write!(f, "Finalizing"),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    /// Ran for the full duration
    Completed,
    /// Stopped by the operator
    Cancelled,
    /// Reset or configure handshake failed
    NegotiationFailed,
    /// A keepalive tick failed mid-run
    KeepaliveFailed,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::NegotiationFailed => write!(f, "negotiation failed"),
            Self::KeepaliveFailed => write!(f, "keepalive failed"),
        }
    }
}

/// Parameters a session was started with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Run length
    pub duration: Duration,
    /// Simulated baud label as entered
    pub baud_token: String,
    /// Keepalive cadence derived from the baud label
    pub interval: Duration,
    /// Selected profile
    pub selection: ProfileSelection,
    /// Resolved limits installed for the run
    pub profile: ChargerProfile,
}

impl fmt::Display for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Starting simulation for {} seconds - profile {}, {}, simulated baud {}, keepalive interval {:.2}s.",
            self.duration.as_secs_f64(),
            self.selection,
            self.profile,
            self.baud_token,
            self.interval.as_secs_f64()
        )
    }
}

/// Lifecycle event emitted by a running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session accepted and limits installed
    Started {
        /// Session identifier
        session_id: Uuid,
        /// Resolved parameters
        params: SessionParams,
    },
    /// Reset and configure handshake begins
    Negotiating {
        /// Session identifier
        session_id: Uuid,
    },
    /// Handshake failed; the session goes straight to finalizing
    NegotiationFailed {
        /// Session identifier
        session_id: Uuid,
        /// Failing step and device error
        reason: String,
    },
    /// One keepalive was sent
    Tick {
        /// Session identifier
        session_id: Uuid,
        /// Seconds since the session started, read before the interval sleep
        elapsed_secs: f64,
    },
    /// A keepalive failed; the loop ends early
    KeepaliveFailed {
        /// Session identifier
        session_id: Uuid,
        /// Device error
        reason: String,
    },
    /// Writing back the saved limits failed
    RestorationFailed {
        /// Session identifier
        session_id: Uuid,
        /// Device error
        reason: String,
    },
    /// Session is over; the pack is idle and limits are restored
    Finished {
        /// Session identifier
        session_id: Uuid,
        /// Final outcome
        outcome: SessionOutcome,
    },
}

impl SessionEvent {
    /// Session this event belongs to
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        match self {
            Self::Started { session_id, .. }
            | Self::Negotiating { session_id }
            | Self::NegotiationFailed { session_id, .. }
            | Self::Tick { session_id, .. }
            | Self::KeepaliveFailed { session_id, .. }
            | Self::RestorationFailed { session_id, .. }
            | Self::Finished { session_id, .. } => *session_id,
        }
    }

    /// Whether this is the terminal event
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { params, .. } => write!(f, "{params}"),
            Self::Negotiating { .. } => write!(f, "Sending reset and initial configure..."),
            Self::NegotiationFailed { reason, .. } => {
                write!(f, "Initial charger negotiation failed: {reason}")
            }
            Self::Tick { elapsed_secs, .. } => write!(f, "Keepalive at t={elapsed_secs:.1}s"),
            Self::KeepaliveFailed { reason, .. } => write!(f, "keepalive() failed: {reason}"),
            Self::RestorationFailed { reason, .. } => {
                write!(f, "Restoring previous parameters failed: {reason}")
            }
            Self::Finished { .. } => write!(
                f,
                "Simulation finished. Pack returned to idle. Parameters restored to previous values."
            ),
        }
    }
}

/// Summary returned when a session worker is joined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Session identifier
    pub session_id: Uuid,
    /// Final outcome
    pub outcome: SessionOutcome,
    /// Number of keepalive ticks sent in the running loop
    pub ticks: u32,
    /// Wall time from start to finish
    pub elapsed: Duration,
    /// Whether both saved limits were written back without error
    pub restored: bool,
}

/// Status line shown next to the simulation controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Device bound, nothing has run yet
    Ready,
    /// A session is in progress
    Running {
        /// Selected profile
        selection: ProfileSelection,
        /// Simulated baud label
        baud_token: String,
    },
    /// Last session finished
    Idle,
    /// No device bound
    Disconnected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready for simulation."),
            Self::Running {
                selection,
                baud_token,
            } => write!(
                f,
                "Simulation running ({selection}, simulated baud {baud_token})."
            ),
            Self::Idle => write!(f, "Simulation idle. Ready for next run."),
            Self::Disconnected => {
                write!(f, "Simulation idle. Connect to a battery to enable.")
            }
        }
    }
}
