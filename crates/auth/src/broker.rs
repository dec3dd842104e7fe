//! Registry of interactive challenges awaiting an answer

use crate::Challenge;
use chrono::{DateTime, Utc};
use pkgd_errors::AuthError;
use pkgd_types::Caller;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use uuid::Uuid;

/// A pending challenge as shown to authentication agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeInfo {
    pub id: String,
    pub caller: Caller,
    pub action: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

struct Pending {
    info: ChallengeInfo,
    responder: oneshot::Sender<bool>,
}

#[derive(Default)]
pub struct ChallengeBroker {
    pending: Mutex<HashMap<String, Pending>>,
}

impl ChallengeBroker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new challenge for `caller` wanting `action`
    pub fn open(self: &Arc<Self>, caller: &Caller, action: &str) -> Challenge {
        let id = Uuid::new_v4().to_string();
        let prompt = format!("Authentication is required to {action} packages ({caller})");
        let (responder, receiver) = oneshot::channel();
        let info = ChallengeInfo {
            id: id.clone(),
            caller: *caller,
            action: action.to_string(),
            prompt: prompt.clone(),
            created_at: Utc::now(),
        };
        tracing::info!(challenge = %id, caller = %caller, action, "authorization challenge opened");
        self.pending().insert(id.clone(), Pending { info, responder });

        Challenge {
            id,
            prompt,
            answer: Some(receiver),
            broker: Arc::downgrade(self),
        }
    }

    /// Challenges still waiting for an answer, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<ChallengeInfo> {
        let mut infos: Vec<_> = self
            .pending()
            .values()
            .map(|pending| pending.info.clone())
            .collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    /// Answer a pending challenge
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ChallengeNotFound` if the id is unknown, already
    /// answered or withdrawn.
    pub fn respond(&self, id: &str, granted: bool) -> Result<(), AuthError> {
        let pending = self
            .pending()
            .remove(id)
            .ok_or_else(|| AuthError::ChallengeNotFound {
                challenge: id.to_string(),
            })?;
        tracing::info!(challenge = %id, granted, "authorization challenge answered");
        // the waiting transaction may have timed out in the meantime
        let _ = pending.responder.send(granted);
        Ok(())
    }

    /// Forget a challenge nobody waits for anymore
    pub fn withdraw(&self, id: &str) {
        if self.pending().remove(id).is_some() {
            tracing::debug!(challenge = %id, "authorization challenge withdrawn");
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }
}
