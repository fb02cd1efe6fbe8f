#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # m18sim
//!
//! Charging-session simulation engine for serial-controlled M18 battery packs.
//!
//! The engine pretends to be a charger: it swaps a charger profile's cutoff and
//! max current onto the pack's control link, walks the reset/configure
//! handshake, then sends keepalives at a chosen cadence for a fixed duration.
//! No current ever flows; only parameters and message cadence change.
//!
//! ## Guarantees
//!
//! - At most one session runs per [`SessionSupervisor`]
//! - Stopping is cooperative and idempotent
//! - However a session ends (completion, stop, negotiation or keepalive
//!   failure) the pack is sent to idle and its previous cutoff/max parameters
//!   are written back before [`SessionEvent::Finished`] is emitted
//!
//! ## Quick Start
//!
//! ```no_run
//! use m18sim::{event_channel, mock::MockCharger, ProfileSelection, SessionSupervisor};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (observer, mut events) = event_channel();
//!     let mut supervisor = SessionSupervisor::new(observer);
//!     supervisor.bind_device(Arc::new(Mutex::new(MockCharger::new(300, 6000))));
//!
//!     supervisor.start(2.0, "4800", ProfileSelection::Gentle)?;
//!     while let Some(event) = events.recv().await {
//!         println!("{event}");
//!         if event.is_finished() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

/// Named and custom charger profiles
pub mod catalog;
/// Simulated baud rate to keepalive cadence
pub mod clock;
/// Error types and handling
pub mod error;
/// Scriptable charger link for tests and demos
pub mod mock;
/// Charger link contract consumed from the protocol layer
pub mod protocol;
/// Simulation session state machine
pub mod session;
/// Single-session supervisor and event observers
pub mod supervisor;
/// Type definitions and data structures
pub mod types;

pub use catalog::{CustomProfileEditor, ProfileCatalog};
pub use clock::SessionClock;
pub use error::{Result, SimError};
pub use protocol::{ChargerLink, ConfigureMode};
pub use session::{CancelSignal, LimitsGuard, SimulationSession};
pub use supervisor::{event_channel, SessionObserver, SessionSupervisor, TracingObserver};
pub use types::{
    ChargerProfile, ProfileSelection, SessionConfig, SessionEvent, SessionOutcome, SessionParams,
    SessionReport, SessionStage, SessionStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed UART rate of the pack's control link
///
/// The simulated baud labels never change this; they only pick how often
/// keepalives are sent.
pub const PACK_UART_BAUD: u32 = 4800;
