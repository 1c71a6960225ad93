//! Heartbeat configuration and cadence bookkeeping.
//!
//! The heartbeat is the fixed tick of the control loop. Slower rhythms
//! (metabolism, introspection, goal checks) ride on top of it and fire when
//! their interval has elapsed since they last ran.

use anima_core::config::OrganismConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Configuration for the organism heartbeat
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often the loop wakes up (default: 100ms)
    pub interval: Duration,
    /// Idle decay and emotion cleanup (default: 10s)
    pub metabolism: Duration,
    /// Self-narrative refresh (default: 180s)
    pub introspection: Duration,
    /// Goal arbitration (default: 30s)
    pub goal_check: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            metabolism: Duration::from_secs(10),
            introspection: Duration::from_secs(180),
            goal_check: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    pub fn from_config(cfg: &OrganismConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.tick_interval_ms.max(1)),
            metabolism: Duration::from_secs(cfg.metabolism_interval_secs),
            introspection: Duration::from_secs(cfg.introspection_interval_secs),
            goal_check: Duration::from_secs(cfg.goal_check_interval_secs),
        }
    }
}

/// Which slow rhythms are due on this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueWork {
    pub metabolism: bool,
    pub introspection: bool,
    pub goal_check: bool,
}

impl DueWork {
    pub fn any(&self) -> bool {
        self.metabolism || self.introspection || self.goal_check
    }
}

/// Last-run marks for each slow rhythm.
#[derive(Debug, Clone)]
pub struct Cadence {
    config: HeartbeatConfig,
    last_metabolism: DateTime<Utc>,
    last_introspection: DateTime<Utc>,
    last_goal_check: DateTime<Utc>,
}

impl Cadence {
    /// All rhythms start counting from `start`.
    pub fn new(config: HeartbeatConfig, start: DateTime<Utc>) -> Self {
        Self {
            config,
            last_metabolism: start,
            last_introspection: start,
            last_goal_check: start,
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Report what is due at `now` and advance the marks of everything due.
    pub fn poll(&mut self, now: DateTime<Utc>) -> DueWork {
        let due = DueWork {
            metabolism: elapsed(self.last_metabolism, now) > self.config.metabolism,
            introspection: elapsed(self.last_introspection, now) > self.config.introspection,
            goal_check: elapsed(self.last_goal_check, now) > self.config.goal_check,
        };
        if due.metabolism {
            self.last_metabolism = now;
        }
        if due.introspection {
            self.last_introspection = now;
        }
        if due.goal_check {
            self.last_goal_check = now;
        }
        due
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_nothing_due_at_start() {
        let start = Utc::now();
        let mut cadence = Cadence::new(HeartbeatConfig::default(), start);
        assert!(!cadence.poll(start).any());
    }

    #[test]
    fn test_rhythms_fire_independently() {
        let start = Utc::now();
        let mut cadence = Cadence::new(HeartbeatConfig::default(), start);

        let due = cadence.poll(start + ChronoDuration::seconds(11));
        assert_eq!(
            due,
            DueWork {
                metabolism: true,
                introspection: false,
                goal_check: false
            }
        );

        let due = cadence.poll(start + ChronoDuration::seconds(31));
        assert!(due.metabolism);
        assert!(due.goal_check);
        assert!(!due.introspection);

        let due = cadence.poll(start + ChronoDuration::seconds(181));
        assert!(due.introspection);
    }

    #[test]
    fn test_marks_advance_after_firing() {
        let start = Utc::now();
        let mut cadence = Cadence::new(HeartbeatConfig::default(), start);
        assert!(cadence.poll(start + ChronoDuration::seconds(11)).metabolism);
        assert!(!cadence.poll(start + ChronoDuration::seconds(12)).metabolism);
        assert!(cadence.poll(start + ChronoDuration::seconds(22)).metabolism);
    }

    #[test]
    fn test_clock_going_backwards_fires_nothing() {
        let start = Utc::now();
        let mut cadence = Cadence::new(HeartbeatConfig::default(), start);
        assert!(!cadence.poll(start - ChronoDuration::hours(1)).any());
    }

    #[test]
    fn test_from_config() {
        let cfg = OrganismConfig {
            tick_interval_ms: 0,
            goal_check_interval_secs: 7,
            ..Default::default()
        };
        let hb = HeartbeatConfig::from_config(&cfg);
        assert_eq!(hb.interval, Duration::from_millis(1));
        assert_eq!(hb.goal_check, Duration::from_secs(7));
    }
}
