//! ==============================================================================
//! state.rs - live state cache and action log
//! ==============================================================================
//!
//! purpose:
//!     the two in-memory structures a dashboard sees on connect.
//!     neither is synchronized on its own - the relay owns both behind one
//!     lock so an update and its broadcast happen together.
//!
//! ==============================================================================

use std::collections::VecDeque;

use chrono::{Local, Timelike, Utc};

use crate::domain::{ActionLogEntry, LiveState, NewReading};

/// how many action log entries are kept
pub const ACTION_LOG_CAPACITY: usize = 5;

/// most recent sensor reading plus the appliance flag
#[derive(Debug, Default)]
pub struct LiveCache {
    state: LiveState,
}

impl LiveCache {
    /// overwrite the sensor fields, keep the appliance flag, stamp now
    pub fn apply_reading(&mut self, reading: &NewReading) -> LiveState {
        self.state.current = reading.current;
        self.state.voltage = reading.voltage;
        self.state.motion_detected = reading.motion_detected;
        self.touch();
        self.state.clone()
    }

    pub fn set_appliance(&mut self, on: bool) -> LiveState {
        self.state.appliance_status = on;
        self.touch();
        self.state.clone()
    }

    pub fn snapshot(&self) -> LiveState {
        self.state.clone()
    }

    fn touch(&mut self) {
        // never move backwards, even if the wall clock does
        let now = Utc::now();
        if now > self.state.timestamp {
            self.state.timestamp = now;
        }
    }
}

/// newest-first ring of the last few operator actions
#[derive(Debug)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    capacity: usize,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::with_capacity(ACTION_LOG_CAPACITY)
    }
}

impl ActionLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn append(&mut self, action: &str, details: &str) -> ActionLogEntry {
        let now = Local::now().time();
        let entry = ActionLogEntry {
            timestamp: now.with_nanosecond(0).unwrap_or(now),
            action: action.to_string(),
            details: details.to_string(),
        };
        self.entries.push_front(entry.clone());
        self.entries.truncate(self.capacity);
        entry
    }

    pub fn list(&self) -> Vec<ActionLogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_replaces_sensor_fields_and_keeps_appliance() {
        let mut cache = LiveCache::default();
        cache.set_appliance(true);
        let before = cache.snapshot().timestamp;

        let snap = cache.apply_reading(&NewReading {
            current: 1.25,
            voltage: 229.5,
            motion_detected: true,
        });

        assert_eq!(snap.current, 1.25);
        assert_eq!(snap.voltage, 229.5);
        assert!(snap.motion_detected);
        assert!(snap.appliance_status);
        assert!(snap.timestamp >= before);
        assert_eq!(snap, cache.snapshot());
    }

    #[test]
    fn defaulted_reading_zeroes_previous_values() {
        let mut cache = LiveCache::default();
        cache.apply_reading(&NewReading {
            current: 3.0,
            voltage: 120.0,
            motion_detected: true,
        });
        let snap = cache.apply_reading(&NewReading {
            voltage: 118.0,
            ..Default::default()
        });
        assert_eq!(snap.current, 0.0);
        assert_eq!(snap.voltage, 118.0);
        assert!(!snap.motion_detected);
    }

    #[test]
    fn log_keeps_five_newest_first() {
        let mut log = ActionLog::default();
        for i in 1..=6 {
            log.append("Control", &format!("event {}", i));
        }
        let entries = log.list();

        assert_eq!(entries.len(), ACTION_LOG_CAPACITY);
        assert_eq!(entries[0].details, "event 6");
        assert_eq!(entries[4].details, "event 2");
        assert!(entries.iter().all(|e| e.details != "event 1"));
    }

    #[test]
    fn log_timestamps_have_whole_seconds() {
        let mut log = ActionLog::default();
        let entry = log.append("Control", "Appliance turned OFF");
        assert_eq!(entry.timestamp.nanosecond(), 0);
        assert_eq!(entry.timestamp.to_string().len(), "HH:MM:SS".len());
    }
}
