use async_trait::async_trait;
use std::fmt;

use crate::error::Result;

/// Configure codes understood by the pack
///
/// The pack only distinguishes the two charger phases; any other code is
/// passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigureMode {
    /// Active charging phase
    Active = 1,
    /// Pre-charge / negotiation phase
    PreCharge = 2,
}

impl ConfigureMode {
    /// Convert a raw configure code
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Active),
            2 => Some(Self::PreCharge),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active charging ({})", *self as u8),
            Self::PreCharge => write!(f, "pre-charge ({})", *self as u8),
        }
    }
}

/// Control link to an M18 pack
///
/// This is the contract the session engine consumes from the serial protocol
/// layer. Protocol calls are issued strictly one at a time; implementations
/// own framing, timing and the fixed-rate UART.
///
/// `cutoff_current` and `max_current` are charger parameters held on the
/// handle in raw units (1000 raw ≈ 1 A). The protocol layer stamps them into
/// the frames it builds, so writing them changes what later calls announce.
#[async_trait]
pub trait ChargerLink: Send {
    /// Reset the pack's charger state machine
    async fn reset(&mut self) -> Result<()>;

    /// Announce a charger phase; see [`ConfigureMode`] for known codes
    async fn configure(&mut self, mode: u8) -> Result<()>;

    /// Request a snapshot; only success matters to the session engine
    async fn get_snapshot(&mut self) -> Result<()>;

    /// Tell the pack the controlling charger is still present
    async fn keepalive(&mut self) -> Result<()>;

    /// Return the pack to idle
    ///
    /// Must be safe to call after any earlier failure.
    async fn idle(&mut self) -> Result<()>;

    /// Current cutoff parameter in raw units
    fn cutoff_current(&self) -> u32;

    /// Current max parameter in raw units
    fn max_current(&self) -> u32;

    /// Overwrite the cutoff parameter
    ///
    /// # Errors
    ///
    /// Returns an error if the handle refuses the value.
    fn set_cutoff_current(&mut self, raw: u32) -> Result<()>;

    /// Overwrite the max parameter
    ///
    /// # Errors
    ///
    /// Returns an error if the handle refuses the value.
    fn set_max_current(&mut self, raw: u32) -> Result<()>;
}
