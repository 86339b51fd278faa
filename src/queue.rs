//! command queue - the persisted commands a device has not picked up yet
//!
//! delivery is pull-based and at-most-once: a drained command is marked
//! executed before it leaves the store and is never handed out again.

use crate::domain::DeviceCommand;
use crate::store::Store;

#[derive(Clone, Debug)]
pub struct CommandQueue {
    store: Store,
}

impl CommandQueue {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// persist a new pending command, returning its id
    pub async fn enqueue(&self, command: &str, value: bool) -> Result<i64, sqlx::Error> {
        let cmd = self.store.insert_command(command, value).await?;
        tracing::debug!(id = cmd.id, command, value, "command queued");
        Ok(cmd.id)
    }

    /// every pending command in creation order; all of them are marked executed
    pub async fn drain(&self) -> Result<Vec<DeviceCommand>, sqlx::Error> {
        let taken = self.store.take_pending_commands().await?;
        if !taken.is_empty() {
            tracing::info!(count = taken.len(), "delivered pending commands");
        }
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::APPLIANCE_CONTROL;
    use crate::store::memory_store;

    #[tokio::test]
    async fn second_drain_only_sees_newer_commands() {
        let queue = CommandQueue::new(memory_store().await);
        let first = queue.enqueue(APPLIANCE_CONTROL, true).await.unwrap();
        let second = queue.enqueue(APPLIANCE_CONTROL, false).await.unwrap();

        let drained = queue.drain().await.unwrap();
        assert_eq!(drained.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first, second]);

        let third = queue.enqueue(APPLIANCE_CONTROL, true).await.unwrap();
        let drained = queue.drain().await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, third);

        assert!(queue.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_drains_never_share_a_command() {
        let queue = CommandQueue::new(memory_store().await);
        for i in 0..20 {
            queue.enqueue(APPLIANCE_CONTROL, i % 2 == 0).await.unwrap();
        }

        let (a, b) = tokio::join!(queue.drain(), queue.drain());
        let mut ids: Vec<i64> = a.unwrap().into_iter().chain(b.unwrap()).map(|c| c.id).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();

        assert_eq!(before, 20);
        assert_eq!(ids.len(), 20);
    }
}
