use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    catalog::ProfileCatalog,
    clock::SessionClock,
    error::{Result, SimError},
    protocol::ChargerLink,
    session::{CancelSignal, SimulationSession},
    types::{
        ProfileSelection, SessionConfig, SessionEvent, SessionParams, SessionReport,
        SessionStatus,
    },
};

/// Receives session lifecycle events
///
/// Called from the worker task, so implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &SessionEvent);
}

/// Writes every event to the `tracing` log in operator wording
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::NegotiationFailed { .. } | SessionEvent::KeepaliveFailed { .. } => {
                warn!("{}", event);
            }
            SessionEvent::RestorationFailed { .. } => error!("{}", event),
            _ => info!("{}", event),
        }
    }
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_event(&self, event: &SessionEvent) {
        // a dropped receiver just means nobody is watching any more
        let _ = self.send(event.clone());
    }
}

/// Create an observer backed by an unbounded channel
#[must_use]
pub fn event_channel() -> (
    Arc<dyn SessionObserver>,
    mpsc::UnboundedReceiver<SessionEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

struct ActiveSession {
    id: Uuid,
    selection: ProfileSelection,
    baud_token: String,
    cancel: CancelSignal,
    handle: JoinHandle<SessionReport>,
}

/// Starts and stops simulated charging sessions against one charger link
///
/// At most one session runs at a time; a start request while one is running is
/// rejected. The link is shared with the caller: the worker holds it
/// exclusively only while a session runs.
///
/// # Examples
///
/// ```no_run
/// use m18sim::{mock::MockCharger, ProfileSelection, SessionSupervisor, TracingObserver};
/// use std::sync::Arc;
/// use tokio::sync::Mutex;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut supervisor = SessionSupervisor::new(Arc::new(TracingObserver));
///     supervisor.bind_device(Arc::new(Mutex::new(MockCharger::new(300, 6000))));
///
///     supervisor.start(10.0, "4800", ProfileSelection::Normal)?;
///     let report = supervisor.join().await?;
///     println!("{report:?}");
///     Ok(())
/// }
/// ```
pub struct SessionSupervisor<L: ChargerLink + 'static> {
    link: Option<Arc<Mutex<L>>>,
    catalog: ProfileCatalog,
    clock: SessionClock,
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    active: Option<ActiveSession>,
    has_run: bool,
}

impl<L: ChargerLink + 'static> SessionSupervisor<L> {
    /// Create a supervisor with default settings
    #[must_use]
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self::with_config(SessionConfig::default(), observer)
    }

    /// Create a supervisor with custom settings
    #[must_use]
    pub fn with_config(config: SessionConfig, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            link: None,
            catalog: ProfileCatalog::new(&config),
            clock: SessionClock::new(Duration::from_millis(config.default_interval_ms)),
            config,
            observer,
            active: None,
            has_run: false,
        }
    }

    /// Attach a connected charger link
    pub fn bind_device(&mut self, link: Arc<Mutex<L>>) {
        info!("Charger link bound");
        self.link = Some(link);
    }

    /// Detach the charger link, stopping any running session first
    ///
    /// A running worker keeps its own reference and still finalizes.
    pub fn unbind_device(&mut self) -> Option<Arc<Mutex<L>>> {
        self.stop();
        let link = self.link.take();
        if link.is_some() {
            info!("Charger link released");
        }
        link
    }

    /// Currently bound link
    #[must_use]
    pub const fn device(&self) -> Option<&Arc<Mutex<L>>> {
        self.link.as_ref()
    }

    /// Profile catalog
    #[must_use]
    pub const fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    /// Profile catalog, for editing the Custom profile
    pub fn catalog_mut(&mut self) -> &mut ProfileCatalog {
        &mut self.catalog
    }

    /// Whether a session worker is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Identifier of the running session
    #[must_use]
    pub fn active_session(&self) -> Option<Uuid> {
        self.active
            .as_ref()
            .filter(|active| !active.handle.is_finished())
            .map(|active| active.id)
    }

    /// Status line for the simulation controls
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if let Some(active) = self.active.as_ref().filter(|a| !a.handle.is_finished()) {
            return SessionStatus::Running {
                selection: active.selection,
                baud_token: active.baud_token.clone(),
            };
        }
        if self.link.is_none() {
            SessionStatus::Disconnected
        } else if self.has_run || self.active.is_some() {
            SessionStatus::Idle
        } else {
            SessionStatus::Ready
        }
    }

    /// Start a session in the background
    ///
    /// Returns as soon as the worker is spawned; progress arrives through the
    /// observer. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SimError::AlreadyRunning`] if a session is still running
    /// - [`SimError::NoConnection`] if no link is bound
    /// - [`SimError::InvalidDuration`] if `duration_secs` is not a positive, finite number
    /// - [`SimError::InvalidProfile`] if the Custom profile fields are invalid
    pub fn start(
        &mut self,
        duration_secs: f64,
        baud_token: &str,
        selection: ProfileSelection,
    ) -> Result<Uuid> {
        if self.is_running() {
            return Err(SimError::AlreadyRunning);
        }
        let link = self.link.clone().ok_or(SimError::NoConnection)?;
        let duration = parse_duration(duration_secs)?;
        let profile = self.catalog.resolve(selection)?;

        if profile.is_inverted() {
            warn!(
                "Profile {} has cutoff {} above max {}; forwarding unchanged",
                selection, profile.cutoff_raw, profile.max_raw
            );
        }

        let baud_token = baud_token.trim().to_string();
        let params = SessionParams {
            duration,
            interval: self.clock.interval_for(&baud_token),
            baud_token: baud_token.clone(),
            selection,
            profile,
        };

        if let Some(finished) = self.active.take() {
            debug!("Reaping finished session {}", finished.id);
        }

        let cancel = CancelSignal::new();
        let session = SimulationSession::new(
            params,
            self.config.clone(),
            link,
            cancel.clone(),
            self.observer.clone(),
        );
        let id = session.id();
        info!("{}", session.params());

        let handle = tokio::spawn(session.run());
        self.active = Some(ActiveSession {
            id,
            selection,
            baud_token,
            cancel,
            handle,
        });
        self.has_run = true;

        Ok(id)
    }

    /// Start a session from the text fields of the simulation panel
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start); an unparsable duration is
    /// [`SimError::InvalidDuration`] and an unknown profile label is
    /// [`SimError::InvalidProfile`].
    pub fn start_from_text(
        &mut self,
        duration: &str,
        baud_token: &str,
        profile: &str,
    ) -> Result<Uuid> {
        if self.is_running() {
            return Err(SimError::AlreadyRunning);
        }
        if self.link.is_none() {
            return Err(SimError::NoConnection);
        }
        let duration_secs = duration
            .trim()
            .parse::<f64>()
            .map_err(|_| SimError::InvalidDuration {
                seconds: duration.trim().to_string(),
            })?;
        let selection = profile.parse::<ProfileSelection>()?;
        self.start(duration_secs, baud_token, selection)
    }

    /// Ask the running session to stop
    ///
    /// Idempotent; does nothing when no session is running. The worker notices
    /// within one keepalive interval, or once negotiation is over.
    pub fn stop(&self) {
        if let Some(active) = self.active.as_ref().filter(|a| !a.handle.is_finished()) {
            if active.cancel.cancel() {
                info!("Stop requested for session {}", active.id);
            }
        }
    }

    /// Wait for the most recent session to finish and collect its report
    ///
    /// # Errors
    ///
    /// Returns [`SimError::WorkerFailed`] if there is no session to join or the
    /// worker panicked or was aborted.
    pub async fn join(&mut self) -> Result<SessionReport> {
        let active = self
            .active
            .take()
            .ok_or_else(|| SimError::WorkerFailed("no session to join".to_string()))?;
        active
            .handle
            .await
            .map_err(|e| SimError::WorkerFailed(e.to_string()))
    }
}

impl<L: ChargerLink + 'static> Drop for SessionSupervisor<L> {
    fn drop(&mut self) {
        // the worker is detached and still finalizes on its own
        self.stop();
    }
}

fn parse_duration(seconds: f64) -> Result<Duration> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(SimError::InvalidDuration {
            seconds: seconds.to_string(),
        });
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| SimError::InvalidDuration {
        seconds: seconds.to_string(),
    })
}
