//! Failure injection for the write path of the reference engine
//!
//! A [`FaultPlan`] makes a phase fail with a chosen error, crash outright,
//! or holds the engine at the start of a phase until released so callers
//! can observe the transaction mid-flight.

use pkgd_errors::EngineError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};

/// Write-path engine calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePhase {
    Resolve,
    Download,
    Test,
    Commit,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::Download => "download",
            Self::Test => "test",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Holds the engine at the start of a phase
#[derive(Debug)]
pub struct PhaseGate {
    entered: Notify,
    open: watch::Sender<bool>,
}

impl PhaseGate {
    fn new() -> Self {
        Self {
            entered: Notify::new(),
            open: watch::Sender::new(false),
        }
    }

    /// Wait until the engine reached the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the engine through, now and on every later call
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub(crate) async fn pass(&self) {
        self.entered.notify_one();
        let mut open = self.open.subscribe();
        // the sender lives as long as the gate
        let _ = open.wait_for(|open| *open).await;
    }
}

#[derive(Debug, Default)]
struct Plan {
    failures: HashMap<EnginePhase, EngineError>,
    gates: HashMap<EnginePhase, Arc<PhaseGate>>,
    crashes: HashSet<EnginePhase>,
    calls: HashMap<EnginePhase, usize>,
}

#[derive(Debug, Default)]
pub struct FaultPlan {
    plan: Mutex<Plan>,
}

impl FaultPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn plan(&self) -> MutexGuard<'_, Plan> {
        self.plan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later call of `phase` fail with `error`
    pub fn fail(&self, phase: EnginePhase, error: EngineError) {
        self.plan().failures.insert(phase, error);
    }

    /// Make every later call of `phase` panic
    pub fn crash(&self, phase: EnginePhase) {
        self.plan().crashes.insert(phase);
    }

    pub fn clear(&self, phase: EnginePhase) {
        let mut plan = self.plan();
        plan.failures.remove(&phase);
        plan.crashes.remove(&phase);
        if let Some(gate) = plan.gates.remove(&phase) {
            gate.open();
        }
    }

    /// Install a gate at the start of `phase`
    pub fn gate(&self, phase: EnginePhase) -> Arc<PhaseGate> {
        Arc::clone(
            self.plan()
                .gates
                .entry(phase)
                .or_insert_with(|| Arc::new(PhaseGate::new())),
        )
    }

    /// How often the engine entered `phase`
    #[must_use]
    pub fn calls(&self, phase: EnginePhase) -> usize {
        self.plan().calls.get(&phase).copied().unwrap_or(0)
    }

    /// Record a call, wait at the gate, then apply the planned failure
    pub(crate) async fn enter(&self, phase: EnginePhase) -> Result<(), EngineError> {
        let gate = {
            let mut plan = self.plan();
            *plan.calls.entry(phase).or_insert(0) += 1;
            plan.gates.get(&phase).cloned()
        };
        if let Some(gate) = gate {
            tracing::debug!(%phase, "engine held at gate");
            gate.pass().await;
        }
        let plan = self.plan();
        if plan.crashes.contains(&phase) {
            drop(plan);
            panic!("injected crash in {phase}");
        }
        match plan.failures.get(&phase) {
            Some(error) => {
                tracing::debug!(%phase, %error, "injected engine failure");
                Err(error.clone())
            }
            None => Ok(()),
        }
    }
}
