//! Bounded per-target FIFO between the host path and the delivery worker.
//!
//! Enqueueing never blocks: a full queue rejects the delivery and the caller
//! counts the drop. The queue has a single consumer, its target's worker.

use crate::target::WebhookTarget;
use atw_core::DispatchEvent;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// One event's payload waiting for delivery to one target.
#[derive(Debug, Clone)]
pub struct QueuedDelivery {
    pub event: Arc<DispatchEvent>,
    pub target: Arc<WebhookTarget>,
    pub payload: Bytes,
    /// 1-based attempt number of the next HTTP call.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the worker may process this entry (retry backoff or rate-limit recheck).
    pub not_before: Option<Instant>,
    pub rate_limit_rechecks: u32,
    /// Backoff delays applied before each retry, in order.
    pub backoff_history: Vec<Duration>,
}

impl QueuedDelivery {
    pub fn new(event: Arc<DispatchEvent>, target: Arc<WebhookTarget>, payload: Bytes) -> Self {
        Self {
            event,
            target,
            payload,
            attempt: 1,
            enqueued_at: Utc::now(),
            not_before: None,
            rate_limit_rechecks: 0,
            backoff_history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Full,
    Closed,
}

/// A delivery the queue refused, handed back to the caller.
#[derive(Debug)]
pub struct Rejected {
    pub reason: RejectReason,
    pub delivery: QueuedDelivery,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<QueuedDelivery>,
    capacity: usize,
    closed: bool,
}

#[derive(Debug)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                capacity: capacity.max(1),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append at the tail. Returns false when the queue is full or closed.
    pub fn enqueue(&self, delivery: QueuedDelivery) -> bool {
        self.try_enqueue(delivery).is_ok()
    }

    /// Append at the tail, handing the delivery back on rejection.
    pub fn try_enqueue(&self, delivery: QueuedDelivery) -> Result<(), Rejected> {
        let mut state = self.lock();
        if state.closed {
            return Err(Rejected {
                reason: RejectReason::Closed,
                delivery,
            });
        }
        if state.items.len() >= state.capacity {
            return Err(Rejected {
                reason: RejectReason::Full,
                delivery,
            });
        }
        state.items.push_back(delivery);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next delivery. Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<QueuedDelivery> {
        loop {
            {
                let mut state = self.lock();
                if let Some(delivery) = state.items.pop_front() {
                    return Some(delivery);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting deliveries. Queued entries can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Remove and return everything still queued.
    pub fn drain(&self) -> Vec<QueuedDelivery> {
        self.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Change the bound. Entries above a lowered bound stay queued.
    pub fn set_capacity(&self, capacity: usize) {
        self.lock().capacity = capacity.max(1);
    }
}
