#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Request routing for pkgd
//!
//! The [`RequestDispatcher`] is the front door behind the IPC transport.
//! Reads go straight to the package engine and never wait for the package
//! database lock; a write is validated, turned into an operation and returned
//! to the caller at once while the transaction runs in the background.
//! Switching repositories is the one write done in place: it takes the lock
//! only if it is free and never queues behind a transaction.

mod request;
pub mod validate;

pub use request::{Reply, Request};

use pkgd_auth::{AuthorizationGate, ChallengeBroker, Decision, QUERY_ACTION, REPOS_ACTION};
use pkgd_engine::PackageEngine;
use pkgd_errors::{DispatchError, Error, Result, UserFacingError};
use pkgd_registry::{Snapshot, Subscription};
use pkgd_transaction::TransactionManager;
use pkgd_types::{Caller, OperationId, Query, API_VERSION};
use std::sync::Arc;

/// Outcome of handling one request
#[derive(Debug)]
pub enum Response {
    Reply(Reply),
    /// The caller attached to an operation; live events arrive on the
    /// subscription after the snapshot
    Attached {
        snapshot: Snapshot,
        subscription: Subscription,
    },
}

impl Response {
    /// The reply frame to send, dropping any subscription
    #[must_use]
    pub fn into_reply(self) -> Reply {
        match self {
            Self::Reply(reply) => reply,
            Self::Attached { snapshot, .. } => Reply::Attached { snapshot },
        }
    }
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

pub struct RequestDispatcher {
    engine: Arc<dyn PackageEngine>,
    gate: Arc<dyn AuthorizationGate>,
    broker: Arc<ChallengeBroker>,
    transactions: Arc<TransactionManager>,
}

impl RequestDispatcher {
    #[must_use]
    pub fn new(
        engine: Arc<dyn PackageEngine>,
        gate: Arc<dyn AuthorizationGate>,
        broker: Arc<ChallengeBroker>,
        transactions: Arc<TransactionManager>,
    ) -> Self {
        Self {
            engine,
            gate,
            broker,
            transactions,
        }
    }

    #[must_use]
    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    /// Handle a request, folding errors into an error reply
    pub async fn dispatch(&self, caller: &Caller, request: Request) -> Response {
        let method = request.method();
        match self.handle(caller, request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(
                    caller = %caller,
                    method,
                    code = error.user_code().unwrap_or("error.unknown"),
                    %error,
                    "request rejected"
                );
                Response::Reply(Reply::from(&error))
            }
        }
    }

    /// Handle a request
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` for malformed or forbidden requests, engine
    /// errors from reads, and registry or auth errors from operation and
    /// challenge requests.
    #[allow(clippy::too_many_lines)]
    pub async fn handle(&self, caller: &Caller, request: Request) -> Result<Response> {
        tracing::trace!(caller = %caller, method = request.method(), "request");
        let reply = match request {
            Request::GetVersion => Reply::Version { api: API_VERSION },

            Request::Packages { filter } => {
                self.query(caller, Query::Packages { filter }).await?
            }

            Request::ByName {
                pattern,
                newest_only,
            } => {
                validate::non_empty("pattern", &pattern)?;
                self.query(
                    caller,
                    Query::ByName {
                        pattern,
                        newest_only,
                    },
                )
                .await?
            }

            Request::Search {
                fields,
                keys,
                match_all,
                newest_only,
            } => {
                if fields.is_empty() || keys.is_empty() {
                    return Err(DispatchError::malformed("search needs fields and keys").into());
                }
                for key in &keys {
                    validate::non_empty("search key", key)?;
                }
                self.query(
                    caller,
                    Query::Search {
                        fields,
                        keys,
                        match_all,
                        newest_only,
                    },
                )
                .await?
            }

            Request::Attribute { package, attribute } => {
                let package = validate::package_id(&package)?;
                validate::non_empty("attribute", &attribute)?;
                self.allow_read(caller).await?;
                let value = self.engine.attribute(&package, &attribute).await?;
                Reply::Attribute { value }
            }

            Request::Repositories { filter } => {
                self.allow_read(caller).await?;
                let ids = self.engine.repositories(&filter).await?;
                Reply::Repositories { ids }
            }

            Request::Repo { id } => {
                validate::non_empty("repo id", &id)?;
                self.allow_read(caller).await?;
                let repo = self.engine.repo(&id).await?;
                Reply::Repo { repo }
            }

            Request::SetEnabledRepos { repos } => {
                for id in &repos {
                    validate::non_empty("repo id", id)?;
                }
                self.allow(caller, REPOS_ACTION, "change enabled repositories").await?;
                let mut lease = self
                    .transactions
                    .context()
                    .lock
                    .acquire_lease(OperationId::new(), *caller)?;
                let result = self.engine.set_enabled_repos(&repos).await;
                lease.release();
                result?;
                tracing::info!(caller = %caller, ?repos, "enabled repositories set");
                Reply::ReposEnabled { repos }
            }

            Request::Groups => {
                self.allow_read(caller).await?;
                Reply::Groups {
                    categories: self.engine.groups().await?,
                }
            }

            Request::GroupPackages { group, all } => {
                validate::non_empty("group", &group)?;
                self.allow_read(caller).await?;
                Reply::Packages {
                    packages: self.engine.group_packages(&group, all).await?,
                }
            }

            Request::HistoryByDays { start, end } => {
                if start > end {
                    return Err(DispatchError::malformed(format!(
                        "history window starts after it ends ({start} > {end})"
                    ))
                    .into());
                }
                self.allow_read(caller).await?;
                Reply::History {
                    transactions: self.engine.history_by_days(start, end).await?,
                }
            }

            Request::HistorySearch { patterns } => {
                if patterns.is_empty() {
                    return Err(DispatchError::malformed("history search needs patterns").into());
                }
                for pattern in &patterns {
                    validate::non_empty("pattern", pattern)?;
                }
                self.allow_read(caller).await?;
                Reply::History {
                    transactions: self.engine.history_search(&patterns).await?,
                }
            }

            Request::HistoryPackages { transaction } => {
                self.allow_read(caller).await?;
                Reply::HistoryPackages {
                    items: self.engine.history_packages(transaction).await?,
                }
            }

            Request::BeginTransaction { action, targets } => {
                let action = validate::action(action, &targets)?;
                let (operation, resumed) = self.transactions.begin(*caller, action);
                tracing::info!(
                    caller = %caller,
                    operation = %operation,
                    resumed,
                    "transaction admitted"
                );
                Reply::Began { operation, resumed }
            }

            Request::Attach { operation } => {
                self.allow_read(caller).await?;
                let registry = &self.transactions.context().registry;
                let (snapshot, subscription) = registry
                    .attach(operation, *caller)
                    .map_err(|_| unknown(operation))?;
                return Ok(Response::Attached {
                    snapshot,
                    subscription,
                });
            }

            Request::Detach { operation } => {
                if self
                    .transactions
                    .context()
                    .registry
                    .phase(operation)
                    .is_none()
                {
                    return Err(unknown(operation).into());
                }
                Reply::Detached { operation }
            }

            Request::Cancel { operation } => {
                let info = self
                    .transactions
                    .context()
                    .registry
                    .info(operation)
                    .ok_or_else(|| unknown(operation))?;
                if info.caller.uid != caller.uid && !caller.is_superuser() {
                    return Err(DispatchError::NotPermitted {
                        what: format!("cancel operation {operation}"),
                    }
                    .into());
                }
                let reply = self.transactions.cancel(operation)?;
                Reply::Cancel { reply }
            }

            Request::Challenges => {
                require_superuser(caller, "list authorization challenges")?;
                Reply::Challenges {
                    challenges: self.broker.list(),
                }
            }

            Request::AnswerChallenge { challenge, granted } => {
                require_superuser(caller, "answer authorization challenges")?;
                self.broker.respond(&challenge, granted)?;
                tracing::info!(
                    caller = %caller,
                    challenge = %challenge,
                    granted,
                    "challenge answered"
                );
                Reply::Answered { challenge }
            }

            Request::LockStatus => {
                require_superuser(caller, "inspect the package database lock")?;
                Reply::LockStatus {
                    status: self.transactions.context().lock.status(),
                }
            }
        };
        Ok(Response::Reply(reply))
    }

    async fn query(&self, caller: &Caller, query: Query) -> Result<Reply> {
        self.allow_read(caller).await?;
        let packages = self.engine.query(&query).await?;
        Ok(Reply::Packages { packages })
    }

    async fn allow_read(&self, caller: &Caller) -> Result<()> {
        self.allow(caller, QUERY_ACTION, "query the package database").await
    }

    /// Requests answered in place never suspend on a challenge; anything but
    /// allow is refused
    async fn allow(&self, caller: &Caller, action: &str, what: &str) -> Result<()> {
        match self.gate.check(caller, action).await? {
            Decision::Allow => Ok(()),
            Decision::Deny | Decision::Challenge(_) => Err(Error::from(DispatchError::NotPermitted {
                what: what.to_string(),
            })),
        }
    }
}

fn unknown(operation: OperationId) -> DispatchError {
    DispatchError::UnknownOperation {
        id: operation.to_string(),
    }
}

fn require_superuser(caller: &Caller, what: &str) -> std::result::Result<(), DispatchError> {
    if caller.is_superuser() {
        Ok(())
    } else {
        Err(DispatchError::NotPermitted {
            what: what.to_string(),
        })
    }
}
