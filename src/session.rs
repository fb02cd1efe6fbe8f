use std::{
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::{sleep, Instant},
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    error::Result,
    protocol::{ChargerLink, ConfigureMode},
    supervisor::SessionObserver,
    types::{
        ChargerProfile, SessionConfig, SessionEvent, SessionOutcome, SessionParams, SessionReport,
        SessionStage,
    },
};

/// Cooperative stop flag shared between a supervisor and its worker
///
/// The flag only ever goes from clear to set.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Create a clear signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    ///
    /// Returns `true` only for the call that actually set the flag.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Exclusive hold on a charger link that puts back its cutoff/max parameters
///
/// The saved pair is captured when the guard is acquired. [`restore`] writes it
/// back explicitly; if the guard is dropped without a successful restore (an
/// aborted worker, a panic in a protocol implementation) the drop handler
/// writes it back instead.
///
/// [`restore`]: LimitsGuard::restore
pub struct LimitsGuard<L: ChargerLink> {
    link: OwnedMutexGuard<L>,
    saved: ChargerProfile,
    restored: bool,
}

impl<L: ChargerLink> LimitsGuard<L> {
    /// Take the link and remember its current parameters
    #[must_use]
    pub fn acquire(link: OwnedMutexGuard<L>) -> Self {
        let saved = ChargerProfile::new(link.cutoff_current(), link.max_current());
        Self {
            link,
            saved,
            restored: false,
        }
    }

    /// Parameters that will be written back
    #[must_use]
    pub const fn saved(&self) -> ChargerProfile {
        self.saved
    }

    /// Install a profile's parameters on the link
    ///
    /// # Errors
    ///
    /// Returns the link's error if either write is refused.
    pub fn apply(&mut self, profile: ChargerProfile) -> Result<()> {
        self.link.set_cutoff_current(profile.cutoff_raw)?;
        self.link.set_max_current(profile.max_raw)?;
        Ok(())
    }

    /// Write the saved parameters back
    ///
    /// Both writes are always attempted. Once this has been called the drop
    /// handler does nothing further, whatever the result.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn restore(&mut self) -> Result<()> {
        self.restored = true;
        let cutoff = self.link.set_cutoff_current(self.saved.cutoff_raw);
        let max = self.link.set_max_current(self.saved.max_raw);
        cutoff.and(max)
    }
}

impl<L: ChargerLink> Deref for LimitsGuard<L> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.link
    }
}

impl<L: ChargerLink> DerefMut for LimitsGuard<L> {
    fn deref_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L: ChargerLink> Drop for LimitsGuard<L> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        warn!("Session ended without finalizing - restoring {}", self.saved);
        if let Err(e) = self.restore() {
            error!("Failed to restore charger parameters: {}", e);
        }
    }
}

/// One simulated charging run
///
/// A session swaps the profile's limits onto the link, negotiates as a charger
/// would, sends keepalives for the requested duration and always finishes by
/// idling the pack and restoring the previous limits. It is consumed by
/// [`run`](Self::run) and cannot be reused.
///
/// Cancellation is only observed in the keepalive loop, so a stop during
/// negotiation lets the handshake finish first. Once running, a stop takes
/// effect within one keepalive interval and no tick is sent after it. A
/// protocol call that never returns keeps the worker blocked; nothing here can
/// interrupt it.
pub struct SimulationSession<L: ChargerLink> {
    id: Uuid,
    params: SessionParams,
    config: SessionConfig,
    link: Arc<Mutex<L>>,
    cancel: CancelSignal,
    observer: Arc<dyn SessionObserver>,
}

impl<L: ChargerLink + 'static> SimulationSession<L> {
    /// Create a session
    #[must_use]
    pub fn new(
        params: SessionParams,
        config: SessionConfig,
        link: Arc<Mutex<L>>,
        cancel: CancelSignal,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            params,
            config,
            link,
            cancel,
            observer,
        }
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Parameters this session runs with
    #[must_use]
    pub const fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Run the session to completion
    ///
    /// Never fails: every stage error becomes an event, and the terminal
    /// [`SessionEvent::Finished`] is emitted exactly once after the link has
    /// been released.
    pub async fn run(self) -> SessionReport {
        let span = info_span!("session", id = %self.id);
        self.run_stages().instrument(span).await
    }

    async fn run_stages(self) -> SessionReport {
        let started_at = Instant::now();
        let mut ticks = 0;

        debug!("Stage {}", SessionStage::Init);
        let mut guard = LimitsGuard::acquire(self.link.clone().lock_owned().await);
        info!(
            "Saved {}; installing {}",
            guard.saved(),
            self.params.profile
        );

        self.emit(SessionEvent::Started {
            session_id: self.id,
            params: self.params.clone(),
        });

        let outcome = if let Err(e) = guard.apply(self.params.profile) {
            self.negotiation_failed(format!("installing charger parameters failed: {e}"));
            SessionOutcome::NegotiationFailed
        } else {
            match self.negotiate(&mut guard).await {
                Err(reason) => {
                    self.negotiation_failed(reason);
                    SessionOutcome::NegotiationFailed
                }
                Ok(()) => self.keep_alive(&mut guard, started_at, &mut ticks).await,
            }
        };

        let restored = self.finalize(guard, outcome).await;

        SessionReport {
            session_id: self.id,
            outcome,
            ticks,
            elapsed: started_at.elapsed(),
            restored,
        }
    }

    async fn negotiate(&self, link: &mut L) -> std::result::Result<(), String> {
        debug!("Stage {}", SessionStage::Negotiating);
        self.emit(SessionEvent::Negotiating {
            session_id: self.id,
        });

        link.reset()
            .await
            .map_err(|e| format!("reset() failed: {e}"))?;

        let precharge = self.config.precharge_mode;
        let active = self.config.active_mode;
        debug!("configure {}", describe_mode(precharge));
        link.configure(precharge)
            .await
            .map_err(|e| format!("configure({precharge}) failed: {e}"))?;
        link.get_snapshot()
            .await
            .map_err(|e| format!("get_snapshot() failed: {e}"))?;

        sleep(self.config.settle_delay()).await;

        link.keepalive()
            .await
            .map_err(|e| format!("keepalive() failed: {e}"))?;
        debug!("configure {}", describe_mode(active));
        link.configure(active)
            .await
            .map_err(|e| format!("configure({active}) failed: {e}"))?;
        link.get_snapshot()
            .await
            .map_err(|e| format!("get_snapshot() failed: {e}"))?;

        info!("Charger negotiation complete");
        Ok(())
    }

    async fn keep_alive(
        &self,
        link: &mut L,
        started_at: Instant,
        ticks: &mut u32,
    ) -> SessionOutcome {
        debug!("Stage {}", SessionStage::Running);
        let duration = self.params.duration;
        let interval = self.params.interval;

        loop {
            if self.cancel.is_cancelled() {
                info!("Stop requested after {} ticks", ticks);
                return SessionOutcome::Cancelled;
            }
            let elapsed = started_at.elapsed();
            if elapsed >= duration {
                return SessionOutcome::Completed;
            }

            sleep(interval).await;

            // a stop that arrived during the sleep must not produce another tick
            if self.cancel.is_cancelled() {
                info!("Stop requested after {} ticks", ticks);
                return SessionOutcome::Cancelled;
            }

            if let Err(e) = link.keepalive().await {
                warn!("keepalive() failed: {}", e);
                self.emit(SessionEvent::KeepaliveFailed {
                    session_id: self.id,
                    reason: e.to_string(),
                });
                return SessionOutcome::KeepaliveFailed;
            }

            // labelled with the time the iteration began
            *ticks += 1;
            let elapsed_secs = elapsed.as_secs_f64();
            debug!("Keepalive {} at t={:.1}s", ticks, elapsed_secs);
            self.emit(SessionEvent::Tick {
                session_id: self.id,
                elapsed_secs,
            });
        }
    }

    async fn finalize(&self, mut guard: LimitsGuard<L>, outcome: SessionOutcome) -> bool {
        debug!("Stage {}", SessionStage::Finalizing);

        if let Err(e) = guard.idle().await {
            debug!("idle() failed during cleanup, ignoring: {}", e);
        }

        let restored = match guard.restore() {
            Ok(()) => {
                info!("Restored {}", guard.saved());
                true
            }
            Err(e) => {
                error!("Failed to restore {}: {}", guard.saved(), e);
                self.emit(SessionEvent::RestorationFailed {
                    session_id: self.id,
                    reason: e.to_string(),
                });
                false
            }
        };
        drop(guard);

        info!("Simulation {}", outcome);
        self.emit(SessionEvent::Finished {
            session_id: self.id,
            outcome,
        });
        restored
    }

    fn negotiation_failed(&self, reason: String) {
        warn!("Initial charger negotiation failed: {}", reason);
        self.emit(SessionEvent::NegotiationFailed {
            session_id: self.id,
            reason,
        });
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }
}

fn describe_mode(code: u8) -> String {
    ConfigureMode::from_u8(code).map_or_else(|| format!("mode {code}"), |mode| mode.to_string())
}
