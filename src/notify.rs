use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, TableId};

const CHANNEL_CAPACITY: usize = 256;

/// In-process broadcast of journal events, one channel per table, so the
/// booking UI layer can refresh availability when a table's day changes.
/// This is not guest-facing notification delivery; that lives outside the
/// core.
pub struct NotifyHub {
    channels: DashMap<TableId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes on one table. Creates the channel if needed.
    pub fn subscribe(&self, table_id: TableId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(table_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event. No-op without subscribers.
    pub fn send(&self, table_id: TableId, event: &Event) {
        if let Some(sender) = self.channels.get(&table_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, table_id: &TableId) {
        self.channels.remove(table_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Table, TableShape};
    use ulid::Ulid;

    fn registered(table_id: TableId) -> Event {
        Event::TableRegistered {
            table: Table {
                id: table_id,
                number: "T1".into(),
                name: None,
                seats: 4,
                shape: TableShape::Round,
                is_active: true,
            },
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_for_its_table() {
        let hub = NotifyHub::new();
        let table_id = Ulid::new();
        let mut rx = hub.subscribe(table_id);

        let event = registered(table_id);
        hub.send(table_id, &event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn events_do_not_cross_tables() {
        let hub = NotifyHub::new();
        let watched = Ulid::new();
        let other = Ulid::new();
        let mut rx = hub.subscribe(watched);

        hub.send(other, &registered(other));
        hub.send(watched, &registered(watched));

        let got = rx.recv().await.unwrap();
        assert!(matches!(got, Event::TableRegistered { table } if table.id == watched));
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let table_id = Ulid::new();
        hub.send(table_id, &registered(table_id));
    }
}
