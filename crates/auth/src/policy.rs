//! Configuration-driven authorization policy

use crate::{AuthorizationGate, ChallengeBroker, Decision};
use async_trait::async_trait;
use pkgd_config::{AuthConfig, Grant};
use pkgd_errors::AuthError;
use pkgd_types::Caller;
use std::sync::Arc;

/// Gate backed by the `[auth]` configuration table
///
/// `none` allows everybody, `forbidden` denies everybody. `elevated` allows
/// the superuser and `elevated_uids`; anybody else is challenged when the
/// policy is interactive and denied otherwise.
pub struct PolicyGate {
    config: AuthConfig,
    broker: Arc<ChallengeBroker>,
}

impl PolicyGate {
    #[must_use]
    pub fn new(config: AuthConfig, broker: Arc<ChallengeBroker>) -> Self {
        Self { config, broker }
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<ChallengeBroker> {
        &self.broker
    }

    fn is_elevated(&self, caller: &Caller) -> bool {
        caller.is_superuser() || self.config.elevated_uids.contains(&caller.uid)
    }
}

#[async_trait]
impl AuthorizationGate for PolicyGate {
    async fn check(&self, caller: &Caller, action: &str) -> Result<Decision, AuthError> {
        let grant = self
            .config
            .actions
            .get(action)
            .copied()
            .ok_or_else(|| AuthError::UnknownAction {
                action: action.to_string(),
            })?;

        let decision = match grant {
            Grant::None => Decision::Allow,
            Grant::Forbidden => Decision::Deny,
            Grant::Elevated if self.is_elevated(caller) => Decision::Allow,
            Grant::Elevated if self.config.interactive => {
                Decision::Challenge(self.broker.open(caller, action))
            }
            Grant::Elevated => Decision::Deny,
        };

        tracing::debug!(
            caller = %caller,
            action,
            grant = ?grant,
            decision = ?decision,
            "authorization checked"
        );
        Ok(decision)
    }
}
