//! In-memory charger link used in tests and demos.

use async_trait::async_trait;

use crate::{
    error::{Result, SimError},
    protocol::ChargerLink,
};

/// One recorded call on a [`MockCharger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    /// `reset()`
    Reset,
    /// `configure(mode)`
    Configure(u8),
    /// `get_snapshot()`
    GetSnapshot,
    /// `keepalive()`
    Keepalive,
    /// `idle()`
    Idle,
    /// Cutoff parameter write
    SetCutoff(u32),
    /// Max parameter write
    SetMax(u32),
}

/// Scriptable stand-in for a serial charger link
///
/// Every call is recorded in order. Failures are armed with the builder
/// methods and reported as [`SimError::Protocol`].
#[derive(Debug, Clone, Default)]
pub struct MockCharger {
    /// Cutoff parameter held on the handle
    cutoff_current: u32,
    /// Max parameter held on the handle
    max_current: u32,
    /// Calls in the order they were made
    calls: Vec<MockCall>,
    /// Keepalives answered so far
    keepalives: u32,
    /// Simulate a reset failure
    fail_reset: bool,
    /// Simulate a configure failure for this code
    fail_configure: Option<u8>,
    /// Simulate snapshot failures
    fail_snapshot: bool,
    /// Keepalives that succeed before every later one fails
    fail_keepalive_after: Option<u32>,
    /// Simulate idle failures
    fail_idle: bool,
    /// Parameter value the handle refuses to store
    rejected_value: Option<u32>,
}

impl MockCharger {
    /// Create a mock holding the given parameters
    #[must_use]
    pub fn new(cutoff_current: u32, max_current: u32) -> Self {
        Self {
            cutoff_current,
            max_current,
            ..Self::default()
        }
    }

    /// Make `reset()` fail
    #[must_use]
    pub const fn failing_reset(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    /// Make `configure(mode)` fail for one code
    #[must_use]
    pub const fn failing_configure(mut self, mode: u8) -> Self {
        self.fail_configure = Some(mode);
        self
    }

    /// Make `get_snapshot()` fail
    #[must_use]
    pub const fn failing_snapshot(mut self) -> Self {
        self.fail_snapshot = true;
        self
    }

    /// Let `count` keepalives succeed, then fail every later one
    ///
    /// The negotiation handshake sends one keepalive of its own.
    #[must_use]
    pub const fn failing_keepalive_after(mut self, count: u32) -> Self {
        self.fail_keepalive_after = Some(count);
        self
    }

    /// Make `idle()` fail
    #[must_use]
    pub const fn failing_idle(mut self) -> Self {
        self.fail_idle = true;
        self
    }

    /// Refuse to store `raw` in either parameter
    #[must_use]
    pub const fn rejecting_value(mut self, raw: u32) -> Self {
        self.rejected_value = Some(raw);
        self
    }

    /// Calls recorded so far
    #[must_use]
    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    /// Number of successful keepalives
    #[must_use]
    pub const fn keepalives(&self) -> u32 {
        self.keepalives
    }

    /// Whether the last protocol call was `idle()`
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find(|call| !matches!(call, MockCall::SetCutoff(_) | MockCall::SetMax(_)))
            .is_some_and(|call| *call == MockCall::Idle)
    }

    fn fail(operation: &str) -> SimError {
        SimError::Protocol(format!("simulated {operation} failure"))
    }

    fn check_value(&self, raw: u32) -> Result<()> {
        if self.rejected_value == Some(raw) {
            return Err(SimError::Protocol(format!("value {raw} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChargerLink for MockCharger {
    async fn reset(&mut self) -> Result<()> {
        self.calls.push(MockCall::Reset);
        if self.fail_reset {
            return Err(Self::fail("reset"));
        }
        Ok(())
    }

    async fn configure(&mut self, mode: u8) -> Result<()> {
        self.calls.push(MockCall::Configure(mode));
        if self.fail_configure == Some(mode) {
            return Err(Self::fail("configure"));
        }
        Ok(())
    }

    async fn get_snapshot(&mut self) -> Result<()> {
        self.calls.push(MockCall::GetSnapshot);
        if self.fail_snapshot {
            return Err(Self::fail("snapshot"));
        }
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        self.calls.push(MockCall::Keepalive);
        if self
            .fail_keepalive_after
            .is_some_and(|limit| self.keepalives >= limit)
        {
            return Err(Self::fail("keepalive"));
        }
        self.keepalives += 1;
        Ok(())
    }

    async fn idle(&mut self) -> Result<()> {
        self.calls.push(MockCall::Idle);
        if self.fail_idle {
            return Err(Self::fail("idle"));
        }
        Ok(())
    }

    fn cutoff_current(&self) -> u32 {
        self.cutoff_current
    }

    fn max_current(&self) -> u32 {
        self.max_current
    }

    fn set_cutoff_current(&mut self, raw: u32) -> Result<()> {
        self.calls.push(MockCall::SetCutoff(raw));
        self.check_value(raw)?;
        self.cutoff_current = raw;
        Ok(())
    }

    fn set_max_current(&mut self, raw: u32) -> Result<()> {
        self.calls.push(MockCall::SetMax(raw));
        self.check_value(raw)?;
        self.max_current = raw;
        Ok(())
    }
}
