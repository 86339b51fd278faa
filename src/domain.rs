//! ==============================================================================
//! domain.rs - shared data model
//! ==============================================================================
//!
//! purpose:
//!     the records that flow between the store, the relay and the api:
//!     persisted readings/commands, the live snapshot, action log entries,
//!     and the events pushed to dashboards.
//!
//! ==============================================================================

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// command tag written for every appliance on/off request
pub const APPLIANCE_CONTROL: &str = "appliance_control";

/// one persisted sensor sample, append-only
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorReading {
    pub id: i64,
    /// current draw in amps
    pub current: f64,
    /// supply voltage in volts
    pub voltage: f64,
    pub motion_detected: bool,
    pub timestamp: DateTime<Utc>,
}

/// a reading as accepted from the device, before it gets an id
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NewReading {
    pub current: f64,
    pub voltage: f64,
    pub motion_detected: bool,
}

/// a control command waiting for (or already taken by) the device
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceCommand {
    pub id: i64,
    pub command: String,
    pub value: bool,
    pub timestamp: DateTime<Utc>,
    /// flips false -> true exactly once, on first delivery
    #[serde(skip_serializing, default)]
    pub executed: bool,
}

/// the single current snapshot of sensor + appliance status
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveState {
    pub current: f64,
    pub voltage: f64,
    pub motion_detected: bool,
    pub appliance_status: bool,
    pub timestamp: DateTime<Utc>,
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            current: 0.0,
            voltage: 0.0,
            motion_detected: false,
            appliance_status: false,
            timestamp: Utc::now(),
        }
    }
}

/// human readable record of something an operator did
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// local wall-clock time of day, whole seconds ("14:03:27")
    pub timestamp: NaiveTime,
    pub action: String,
    pub details: String,
}

/// appliance on/off request accepted by `POST /control`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    TurnOn,
    TurnOff,
}

impl ControlAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "turn_on" => Some(Self::TurnOn),
            "turn_off" => Some(Self::TurnOff),
            _ => None,
        }
    }

    pub fn appliance_on(self) -> bool {
        matches!(self, Self::TurnOn)
    }

    /// log/response text, e.g. "Appliance turned ON"
    pub fn describe(self) -> &'static str {
        match self {
            Self::TurnOn => "Appliance turned ON",
            Self::TurnOff => "Appliance turned OFF",
        }
    }
}

/// payload of `appliance_status_update`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplianceStatus {
    pub appliance_status: bool,
    pub timestamp: DateTime<Utc>,
}

/// everything pushed over the dashboard channel
///
/// serialized as `{"event": "<name>", "data": <payload>}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    SensorUpdate(LiveState),
    ApplianceStatusUpdate(ApplianceStatus),
    ActionLogged(ActionLogEntry),
    ActionLogUpdate(Vec<ActionLogEntry>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SensorUpdate(_) => "sensor_update",
            Event::ApplianceStatusUpdate(_) => "appliance_status_update",
            Event::ActionLogged(_) => "action_logged",
            Event::ActionLogUpdate(_) => "action_log_update",
        }
    }
}
