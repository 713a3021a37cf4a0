//! Typed event bus — topic-typed observer for core state changes.
//!
//! Workers publish into the bus; subscribers are registered on the UI
//! boundary and drain their receiver on their own thread. Publishing
//! never blocks: disconnected subscribers are dropped on the next send.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use crate::analysis::stats::SignalStats;
use crate::filter::segments::Segment;
use crate::ids::{GraphId, JobIdentity, TabId};

/// Everything the core announces to its collaborators.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    DataLoaded {
        row_count: usize,
        signal_count: usize,
    },
    DataCleared,
    FilterStarted {
        identity: JobIdentity,
    },
    FilterProgress {
        identity: JobIdentity,
        percent: u8,
    },
    FilterApplied {
        identity: JobIdentity,
        segments: Vec<Segment>,
    },
    FilterFailed {
        identity: JobIdentity,
        reason: String,
    },
    ConcatenationApplied {
        tab: TabId,
    },
    ConcatenationCleared {
        tab: TabId,
    },
    CursorMoved {
        c1: Option<f64>,
        c2: Option<f64>,
    },
    CursorsCleared,
    StatsUpdated {
        stats: HashMap<String, SignalStats>,
    },
    LimitsChanged {
        graph: GraphId,
    },
    DeviationChanged {
        graph: GraphId,
    },
}

/// Fan-out bus over `mpsc` channels.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<AnalysisEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> Receiver<AnalysisEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }

    /// Publish to all live subscribers, pruning disconnected ones.
    pub fn publish(&self, event: AnalysisEvent) {
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Drop every subscriber. Part of teardown: observers are unbound
    /// before any worker that might still notify them is destroyed.
    pub fn clear_subscribers(&self) {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.publish(AnalysisEvent::DataCleared);

        assert!(matches!(rx1.try_recv(), Ok(AnalysisEvent::DataCleared)));
        assert!(matches!(rx2.try_recv(), Ok(AnalysisEvent::DataCleared)));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        let _live = bus.subscribe();

        bus.publish(AnalysisEvent::DataCleared);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn clear_subscribers_detaches_everyone() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.clear_subscribers();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(AnalysisEvent::DataCleared);
        assert!(rx.try_recv().is_err());
    }
}
