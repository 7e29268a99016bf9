use serde::Serialize;

use crate::error::ConfigError;

/// Durations and cadence rule for one session engine.
///
/// Fields are private so that every instance went through [`SessionConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    work_secs: u64,
    short_break_secs: u64,
    long_break_secs: u64,
    cycles_before_long_break: u64,
}

impl SessionConfig {
    /// Build a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if any duration is zero or
    /// `cycles_before_long_break` is less than one.
    pub fn new(
        work_secs: u64,
        short_break_secs: u64,
        long_break_secs: u64,
        cycles_before_long_break: u64,
    ) -> Result<Self, ConfigError> {
        for (key, value) in [
            ("work_secs", work_secs),
            ("short_break_secs", short_break_secs),
            ("long_break_secs", long_break_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: "duration must be positive".into(),
                });
            }
        }
        if cycles_before_long_break < 1 {
            return Err(ConfigError::InvalidValue {
                key: "cycles_before_long_break".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(Self {
            work_secs,
            short_break_secs,
            long_break_secs,
            cycles_before_long_break,
        })
    }

    /// Same as [`SessionConfig::new`] with durations given in minutes.
    ///
    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn from_minutes(
        work_min: u64,
        short_break_min: u64,
        long_break_min: u64,
        cycles_before_long_break: u64,
    ) -> Result<Self, ConfigError> {
        Self::new(
            work_min.saturating_mul(60),
            short_break_min.saturating_mul(60),
            long_break_min.saturating_mul(60),
            cycles_before_long_break,
        )
    }

    pub fn work_secs(&self) -> u64 {
        self.work_secs
    }

    pub fn short_break_secs(&self) -> u64 {
        self.short_break_secs
    }

    pub fn long_break_secs(&self) -> u64 {
        self.long_break_secs
    }

    pub fn cycles_before_long_break(&self) -> u64 {
        self.cycles_before_long_break
    }

    /// Whether the break entered after `completed_work_sessions` work phases is long.
    pub fn is_long_break(&self, completed_work_sessions: u64) -> bool {
        completed_work_sessions % self.cycles_before_long_break == 0
    }

    /// Break length chosen on entering Break with the given completed count.
    pub fn break_secs(&self, completed_work_sessions: u64) -> u64 {
        if self.is_long_break(completed_work_sessions) {
            self.long_break_secs
        } else {
            self.short_break_secs
        }
    }
}

impl Default for SessionConfig {
    /// 25 / 5 / 15 minutes, long break every 4th session.
    fn default() -> Self {
        Self {
            work_secs: 25 * 60,
            short_break_secs: 5 * 60,
            long_break_secs: 15 * 60,
            cycles_before_long_break: 4,
        }
    }
}
