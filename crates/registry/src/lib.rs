#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Operation registry for pkgd
//!
//! Every write transaction gets an [`OperationId`] and a record holding its
//! append-only event log. Observers attach at any time: an attach returns the
//! log so far plus a [`Subscription`] for everything appended afterwards, both
//! taken under the record's lock so nothing is missed or seen twice.
//!
//! Terminal operations stay attachable for a retention window and are
//! reaped once no observer remains.

mod subscription;

pub use subscription::{Subscription, SubscriptionId};

use dashmap::DashMap;
use pkgd_errors::RegistryError;
use pkgd_events::{log_event, Outcome, ProgressEvent};
use pkgd_types::{Action, Caller, OperationId, Phase};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// State of an operation at attach time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub operation: OperationId,
    pub phase: Phase,
    /// Events appended so far; only the terminal event once finished
    pub events: Vec<ProgressEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// Summary row describing one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationInfo {
    pub operation: OperationId,
    pub caller: Caller,
    pub action: Action,
    pub phase: Phase,
    pub observers: usize,
}

struct Observer {
    caller: Caller,
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

struct Record {
    caller: Caller,
    action: Action,
    phase: Phase,
    log: Vec<ProgressEvent>,
    outcome: Option<Outcome>,
    observers: HashMap<SubscriptionId, Observer>,
    terminal_at: Option<Instant>,
}

impl Record {
    fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

struct Entry {
    record: Mutex<Record>,
}

impl Entry {
    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct OperationRegistry {
    entries: DashMap<OperationId, Arc<Entry>>,
    retention: Duration,
    next_subscription: AtomicU64,
    /// Serializes create-or-resume so identical requests cannot race
    admission: Mutex<()>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new(retention: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            retention,
            next_subscription: AtomicU64::new(1),
            admission: Mutex::new(()),
        })
    }

    fn entry(&self, id: OperationId) -> Result<Arc<Entry>, RegistryError> {
        self.entries
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::UnknownOperation { id: id.to_string() })
    }

    /// Register a new operation in `Pending`
    #[must_use]
    pub fn create(&self, caller: Caller, action: Action) -> OperationId {
        let record = Record {
            caller,
            action,
            phase: Phase::Pending,
            log: Vec::new(),
            outcome: None,
            observers: HashMap::new(),
            terminal_at: None,
        };
        let entry = Arc::new(Entry {
            record: Mutex::new(record),
        });
        loop {
            let id = OperationId::new();
            if let dashmap::Entry::Vacant(slot) = self.entries.entry(id) {
                slot.insert(entry);
                tracing::debug!(operation = %id, caller = %caller, "operation created");
                return id;
            }
        }
    }

    /// Return the caller's unfinished identical operation, or create one
    ///
    /// The flag is `true` when an existing operation was resumed.
    #[must_use]
    pub fn create_or_resume(&self, caller: Caller, action: Action) -> (OperationId, bool) {
        let _admission = self
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = self.find_resumable(caller, &action) {
            tracing::info!(operation = %id, caller = %caller, "resuming operation");
            return (id, true);
        }
        (self.create(caller, action), false)
    }

    /// Unfinished operation of `caller` for exactly `action`
    #[must_use]
    pub fn find_resumable(&self, caller: Caller, action: &Action) -> Option<OperationId> {
        self.entries.iter().find_map(|item| {
            let record = item.value().record();
            (!record.is_terminal() && record.caller.uid == caller.uid && &record.action == action)
                .then_some(*item.key())
        })
    }

    /// Append an event and deliver it to every attached observer
    ///
    /// Returns the event as stored, with its sequence number.
    ///
    /// # Errors
    ///
    /// Fails for an unknown operation, after the terminal event, or when a
    /// phase entry would move the operation backwards.
    pub fn dispatch(
        &self,
        id: OperationId,
        mut event: ProgressEvent,
    ) -> Result<ProgressEvent, RegistryError> {
        let entry = self.entry(id)?;
        let mut record = entry.record();
        if record.is_terminal() {
            return Err(RegistryError::AlreadyTerminal { id: id.to_string() });
        }

        if event.enters_phase() {
            if event.phase != record.phase && !record.phase.can_advance_to(event.phase) {
                return Err(RegistryError::PhaseRegression {
                    id: id.to_string(),
                    from: record.phase.to_string(),
                    to: event.phase.to_string(),
                });
            }
            record.phase = event.phase;
        } else {
            event.phase = record.phase;
        }

        event.operation = id;
        event.sequence = record.log.len() as u64 + 1;
        log_event(&event);

        if let Some(outcome) = event.outcome() {
            record.outcome = Some(outcome.clone());
            record.terminal_at = Some(Instant::now());
        }
        let terminal = record.is_terminal();

        for observer in record.observers.values_mut() {
            if let Some(sender) = &observer.sender {
                if sender.send(event.clone()).is_err() {
                    observer.sender = None;
                }
            }
            if terminal {
                // closing the channel ends the observer's stream after the terminal event
                observer.sender = None;
            }
        }
        record.log.push(event.clone());
        Ok(event)
    }

    /// Attach an observer
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownOperation` if the id is unknown or was
    /// already reaped.
    pub fn attach(
        self: &Arc<Self>,
        id: OperationId,
        caller: Caller,
    ) -> Result<(Snapshot, Subscription), RegistryError> {
        let entry = self.entry(id)?;
        let mut record = entry.record();

        if record.is_terminal() {
            let events = record.log.last().cloned().into_iter().collect();
            let snapshot = Snapshot {
                operation: id,
                phase: record.phase,
                events,
                outcome: record.outcome.clone(),
            };
            return Ok((snapshot, Subscription::closed(id)));
        }

        let subscription_id =
            SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        record.observers.insert(
            subscription_id,
            Observer {
                caller,
                sender: Some(sender),
            },
        );
        tracing::debug!(operation = %id, caller = %caller, "observer attached");

        let snapshot = Snapshot {
            operation: id,
            phase: record.phase,
            events: record.log.clone(),
            outcome: None,
        };
        let subscription = Subscription::open(id, subscription_id, receiver, Arc::downgrade(self));
        Ok((snapshot, subscription))
    }

    /// Wait for an operation's outcome
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownOperation` if the id is unknown.
    pub async fn wait(
        self: &Arc<Self>,
        id: OperationId,
        caller: Caller,
    ) -> Result<Outcome, RegistryError> {
        let (snapshot, mut subscription) = self.attach(id, caller)?;
        if let Some(outcome) = snapshot.outcome {
            return Ok(outcome);
        }
        while let Some(event) = subscription.recv().await {
            if let Some(outcome) = event.outcome() {
                return Ok(outcome.clone());
            }
        }
        self.outcome(id)
            .ok_or_else(|| RegistryError::UnknownOperation { id: id.to_string() })
    }

    /// Forget an observer; unknown ids are ignored
    pub fn detach(&self, id: OperationId, subscription: SubscriptionId) {
        if let Ok(entry) = self.entry(id) {
            if let Some(observer) = entry.record().observers.remove(&subscription) {
                tracing::debug!(operation = %id, caller = %observer.caller, "observer detached");
            }
        }
    }

    #[must_use]
    pub fn phase(&self, id: OperationId) -> Option<Phase> {
        self.entry(id).ok().map(|entry| entry.record().phase)
    }

    #[must_use]
    pub fn outcome(&self, id: OperationId) -> Option<Outcome> {
        self.entry(id)
            .ok()
            .and_then(|entry| entry.record().outcome.clone())
    }

    #[must_use]
    pub fn info(&self, id: OperationId) -> Option<OperationInfo> {
        let entry = self.entry(id).ok()?;
        let record = entry.record();
        Some(OperationInfo {
            operation: id,
            caller: record.caller,
            action: record.action.clone(),
            phase: record.phase,
            observers: record.observers.len(),
        })
    }

    /// Every operation still tracked
    #[must_use]
    pub fn list(&self) -> Vec<OperationInfo> {
        let ids: Vec<OperationId> = self.entries.iter().map(|item| *item.key()).collect();
        ids.into_iter().filter_map(|id| self.info(id)).collect()
    }

    /// Operations that have not reached a terminal phase
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|item| !item.value().record().is_terminal())
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop terminal operations past retention with no observers
    ///
    /// Returns how many were removed.
    #[must_use]
    pub fn reap(&self) -> usize {
        let now = Instant::now();
        let retention = self.retention;
        let before = self.entries.len();
        self.entries.retain(|id, entry| {
            let record = entry.record();
            let expired = record.observers.is_empty()
                && record
                    .terminal_at
                    .is_some_and(|at| now.duration_since(at) >= retention);
            if expired {
                tracing::debug!(operation = %id, "operation reaped");
            }
            !expired
        });
        before.saturating_sub(self.entries.len())
    }

    /// Run [`OperationRegistry::reap`] every `interval` until the registry is dropped
    #[must_use]
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let reaped = registry.reap();
                if reaped > 0 {
                    tracing::debug!(reaped, remaining = registry.len(), "reaper pass");
                }
            }
        })
    }
}
