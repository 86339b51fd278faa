//! ==============================================================================
//! relay.rs - the one owner of live state, action log, queue and broadcast
//! ==============================================================================
//!
//! purpose:
//!     every mutation of the live snapshot or the action log happens under a
//!     single async mutex together with the broadcast it causes, so dashboards
//!     see events in the same order the state changed and no update is lost.
//!
//! relationships:
//!     - used by: server.rs (http handlers), ws.rs (dashboard sessions)
//!     - owns: state.rs (LiveCache, ActionLog), queue.rs, broadcast.rs
//!     - uses: store.rs (reading persistence)
//!
//! data flow:
//!
//!     device ──POST /ingest──▶ store ──▶ ┌──────────── lock ────────────┐
//!                                        │ live cache ──▶ hub.publish   │──▶ dashboards
//!     operator ─POST /control─────────▶  │ queue + live + log ──▶ hub   │
//!                                        └──────────────────────────────┘
//!     device ──GET /pending-commands──▶ queue.drain
//!
//! ==============================================================================

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::broadcast::{Hub, Subscription};
use crate::domain::{
    ActionLogEntry, ApplianceStatus, ControlAction, DeviceCommand, Event, LiveState, NewReading,
    SensorReading, APPLIANCE_CONTROL,
};
use crate::queue::CommandQueue;
use crate::state::{ActionLog, LiveCache};
use crate::store::Store;

/// what a newly connected dashboard starts from
pub struct Connected {
    pub snapshot: LiveState,
    pub action_log: Vec<ActionLogEntry>,
    pub subscription: Subscription,
}

/// result of a control request
#[derive(Debug, Clone)]
pub struct ControlOutcome {
    pub command_id: i64,
    pub appliance_status: bool,
    pub message: &'static str,
}

#[derive(Default)]
struct LiveCore {
    live: LiveCache,
    log: ActionLog,
}

struct Inner {
    core: Mutex<LiveCore>,
    store: Store,
    queue: CommandQueue,
    hub: Hub,
}

/// clone-able handle; all clones share the same state
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

impl Relay {
    pub fn new(store: Store, broadcast_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(LiveCore::default()),
                queue: CommandQueue::new(store.clone()),
                store,
                hub: Hub::new(broadcast_capacity),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// persist the reading, fold it into the live state and push it out
    pub async fn ingest(&self, reading: NewReading) -> anyhow::Result<LiveState> {
        // a failed write leaves the live state untouched
        self.inner
            .store
            .insert_reading(&reading)
            .await
            .context("failed to persist sensor reading")?;

        let mut core = self.inner.core.lock().await;
        let snapshot = core.live.apply_reading(&reading);
        self.inner.hub.publish(Event::SensorUpdate(snapshot.clone()));
        drop(core);

        tracing::debug!(
            current = snapshot.current,
            voltage = snapshot.voltage,
            motion = snapshot.motion_detected,
            "sensor reading ingested"
        );
        Ok(snapshot)
    }

    /// queue the command for the device, flip the appliance flag, log, push
    pub async fn control(&self, action: ControlAction) -> anyhow::Result<ControlOutcome> {
        let on = action.appliance_on();
        let message = action.describe();

        // the insert happens under the lock so queue order matches flag order
        let mut core = self.inner.core.lock().await;
        let command_id = self
            .inner
            .queue
            .enqueue(APPLIANCE_CONTROL, on)
            .await
            .context("failed to queue device command")?;

        let snapshot = core.live.set_appliance(on);
        let entry = core.log.append("Control", message);
        self.inner.hub.publish(Event::ApplianceStatusUpdate(ApplianceStatus {
            appliance_status: snapshot.appliance_status,
            timestamp: Utc::now(),
        }));
        self.inner.hub.publish(Event::ActionLogged(entry));
        drop(core);

        tracing::info!(command_id, "appliance control: {}", message);
        Ok(ControlOutcome {
            command_id,
            appliance_status: on,
            message,
        })
    }

    /// current snapshot and action log, newest entry first
    pub async fn status(&self) -> (LiveState, Vec<ActionLogEntry>) {
        let core = self.inner.core.lock().await;
        (core.live.snapshot(), core.log.list())
    }

    /// destructive read of the command queue
    pub async fn pending_commands(&self) -> anyhow::Result<Vec<DeviceCommand>> {
        self.inner
            .queue
            .drain()
            .await
            .context("failed to drain pending commands")
    }

    pub async fn recent_readings(&self, limit: u32) -> anyhow::Result<Vec<SensorReading>> {
        self.inner
            .store
            .recent_readings(limit)
            .await
            .context("failed to load recent readings")
    }

    /// subscribe a dashboard session
    ///
    /// snapshot and subscription are taken under the update lock, so the
    /// session sees every event after its snapshot and none before it.
    pub async fn connect(&self) -> Connected {
        let core = self.inner.core.lock().await;
        let subscription = self.inner.hub.subscribe();
        Connected {
            snapshot: core.live.snapshot(),
            action_log: core.log.list(),
            subscription,
        }
    }

    pub fn session_count(&self) -> usize {
        self.inner.hub.session_count()
    }
}

#[cfg(test)]
pub(crate) async fn test_relay() -> Relay {
    Relay::new(crate::store::memory_store().await, 16)
}
