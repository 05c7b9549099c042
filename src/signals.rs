use std::sync::mpsc::{self, Receiver, Sender};

/// "The grid contents may have changed."
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridUpdated {
    pub width: u32,
    pub height: u32,
    pub revision: u64,
}

/// Fan-out of `GridUpdated` to any number of listeners.
#[derive(Default)]
pub struct SignalBus {
    subscribers: Vec<Sender<GridUpdated>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<GridUpdated> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver to every live subscriber. Receivers that were dropped are pruned.
    pub fn dispatch(&mut self, event: GridUpdated) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut bus = SignalBus::new();
        let keep = bus.subscribe();
        let gone = bus.subscribe();
        drop(gone);
        let ev = GridUpdated { width: 2, height: 3, revision: 9 };
        bus.dispatch(ev);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv().ok(), Some(ev));
    }
}
