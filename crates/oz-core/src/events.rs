//! Per-tick event collection for the audio presenter (§4.B).
//!
//! Grounded on `naive-core::events::EventBus`: pending-queue-then-flush
//! shape and a ring-buffer log of recently flushed events are kept; the
//! listener-callback registry and schema validation are dropped, since §4.B
//! events are a fixed, closed enum consumed once per tick by one reader, not
//! an open string-keyed pub/sub surface for scripts to hook into.

use std::collections::VecDeque;

use crate::ids::ObjectId;
use crate::model::ObjectEvent;

/// One event, tagged with the object it originated from.
#[derive(Debug, Clone, Copy)]
pub struct TickEvent {
    pub source: ObjectId,
    pub event: ObjectEvent,
}

/// Collects events raised during a tick and hands them to the audio
/// presenter as a single batch, then keeps a bounded log of recent batches
/// for diagnostics (§1.1: log context for fatal errors).
pub struct EventBus {
    pending: Vec<TickEvent>,
    log: VecDeque<TickEvent>,
    log_capacity: usize,
}

impl EventBus {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            pending: Vec::new(),
            log: VecDeque::with_capacity(log_capacity),
            log_capacity,
        }
    }

    pub fn emit(&mut self, source: ObjectId, event: ObjectEvent) {
        self.pending.push(TickEvent { source, event });
    }

    /// Drain this tick's events, appending them to the diagnostic log and
    /// returning them for the audio presenter.
    pub fn flush(&mut self) -> Vec<TickEvent> {
        let events: Vec<TickEvent> = self.pending.drain(..).collect();
        for event in &events {
            if self.log.len() == self.log_capacity {
                self.log.pop_front();
            }
            self.log.push_back(*event);
        }
        events
    }

    pub fn recent(&self) -> impl Iterator<Item = &TickEvent> {
        self.log.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Pool;

    #[test]
    fn flush_drains_pending_and_logs_them() {
        let mut pool: Pool<crate::ids::ObjectTag, ()> = Pool::new(4, "object");
        let id = pool.alloc(()).unwrap();

        let mut bus = EventBus::new(8);
        bus.emit(id, ObjectEvent::Create);
        bus.emit(id, ObjectEvent::Step);

        let flushed = bus.flush();
        assert_eq!(flushed.len(), 2);
        assert!(bus.flush().is_empty());
        assert_eq!(bus.recent().count(), 2);
    }

    #[test]
    fn log_is_bounded() {
        let mut pool: Pool<crate::ids::ObjectTag, ()> = Pool::new(4, "object");
        let id = pool.alloc(()).unwrap();

        let mut bus = EventBus::new(2);
        for _ in 0..5 {
            bus.emit(id, ObjectEvent::Step);
            bus.flush();
        }
        assert_eq!(bus.recent().count(), 2);
    }
}
