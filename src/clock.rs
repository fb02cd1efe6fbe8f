use std::time::Duration;

/// Simulated baud labels offered to the operator
///
/// These only pick a keepalive cadence. The real UART to the pack always runs
/// at its fixed rate.
pub const BAUD_TOKENS: [&str; 4] = ["1200", "2400", "4800", "9600"];

/// Maps a simulated baud label to a keepalive interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    default_interval: Duration,
}

impl SessionClock {
    /// Create a clock with the given fallback interval
    #[must_use]
    pub const fn new(default_interval: Duration) -> Self {
        Self { default_interval }
    }

    /// Keepalive interval for a baud label
    ///
    /// Unrecognized labels get the fallback interval.
    #[must_use]
    pub fn interval_for(&self, token: &str) -> Duration {
        match token.trim() {
            "1200" => Duration::from_millis(1000),
            "2400" => Duration::from_millis(750),
            "4800" => Duration::from_millis(500),
            "9600" => Duration::from_millis(250),
            _ => self.default_interval,
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_table() {
        let clock = SessionClock::default();
        assert_eq!(clock.interval_for("1200"), Duration::from_secs(1));
        assert_eq!(clock.interval_for("2400"), Duration::from_millis(750));
        assert_eq!(clock.interval_for("4800"), Duration::from_millis(500));
        assert_eq!(clock.interval_for("9600"), Duration::from_millis(250));
        assert_eq!(clock.interval_for(" 9600 "), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_token_falls_back() {
        let clock = SessionClock::default();
        assert_eq!(clock.interval_for("115200"), Duration::from_millis(500));
        assert_eq!(clock.interval_for(""), Duration::from_millis(500));

        let slow = SessionClock::new(Duration::from_secs(2));
        assert_eq!(slow.interval_for("fast"), Duration::from_secs(2));
        assert_eq!(slow.interval_for("4800"), Duration::from_millis(500));
    }

    #[test]
    fn test_every_offered_token_is_mapped() {
        let clock = SessionClock::new(Duration::ZERO);
        for token in BAUD_TOKENS {
            assert!(clock.interval_for(token) > Duration::ZERO, "{token}");
        }
    }
}
