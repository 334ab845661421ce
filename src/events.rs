// Change notifications for presentation consumers

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Something in the shared state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreEvent {
    InterfaceSampled,
    GroupsChanged,
    ConnectionsChanged,
    BlockedSetChanged,
}

/// Fan-out of core events; publishing never blocks and never fails
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: CoreEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new().publish(CoreEvent::GroupsChanged);
    }

    #[test]
    fn test_subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(CoreEvent::InterfaceSampled);
        bus.publish(CoreEvent::BlockedSetChanged);

        assert_eq!(rx.try_recv().unwrap(), CoreEvent::InterfaceSampled);
        assert_eq!(rx.try_recv().unwrap(), CoreEvent::BlockedSetChanged);
        assert!(rx.try_recv().is_err());
    }
}
