//! Service wiring and socket preparation

use crate::error::DaemonError;
use pkgd_auth::{AuthorizationGate, ChallengeBroker, PolicyGate};
use pkgd_config::Config;
use pkgd_dispatch::RequestDispatcher;
use pkgd_engine::{Catalog, MemoryEngine, PackageEngine};
use pkgd_lock::LockManager;
use pkgd_registry::OperationRegistry;
use pkgd_transaction::{TransactionContext, TransactionManager};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Long-lived components shared by every connection
pub struct Services {
    pub dispatcher: Arc<RequestDispatcher>,
    pub transactions: Arc<TransactionManager>,
    reaper: JoinHandle<()>,
}

impl Services {
    /// Build the engine, authorization, lock and transaction layers
    pub async fn build(config: &Config) -> Result<Self, DaemonError> {
        let engine = Arc::new(load_engine(config).await?);
        let engine: Arc<dyn PackageEngine> = engine;

        let broker = ChallengeBroker::new();
        let gate: Arc<dyn AuthorizationGate> =
            Arc::new(PolicyGate::new(config.auth.clone(), Arc::clone(&broker)));
        let lock = Arc::new(LockManager::new(config.lock.audit_capacity));
        let registry = OperationRegistry::new(config.transaction.retention());
        let reaper = registry.spawn_reaper(config.transaction.reaper_interval());

        let transactions = TransactionManager::new(TransactionContext {
            engine: Arc::clone(&engine),
            gate: Arc::clone(&gate),
            lock,
            registry,
            config: config.transaction.clone(),
        });
        let dispatcher = Arc::new(RequestDispatcher::new(
            engine,
            gate,
            broker,
            Arc::clone(&transactions),
        ));

        info!(
            lock_timeout_secs = config.transaction.lock_timeout_secs,
            auth_timeout_secs = config.transaction.auth_timeout_secs,
            retention_secs = config.transaction.retention_secs,
            "services initialized"
        );
        Ok(Self {
            dispatcher,
            transactions,
            reaper,
        })
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

async fn load_engine(config: &Config) -> Result<MemoryEngine, DaemonError> {
    let engine = match &config.engine.catalog {
        Some(path) => {
            if !path.exists() {
                warn!(path = %path.display(), "catalog missing, starting with an empty one");
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                Catalog::default().save(path).await?;
            }
            MemoryEngine::load(path).await?
        }
        None => {
            warn!("no catalog configured, package database lives in memory only");
            MemoryEngine::new(Catalog::default())
        }
    };
    Ok(engine.with_protected(config.engine.protected.iter().cloned()))
}

/// Bind the control socket, replacing a stale socket file
pub fn bind_socket(path: &Path) -> Result<UnixListener, DaemonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let listener = UnixListener::bind(path).map_err(|e| {
        DaemonError::Setup(format!("cannot bind {}: {e}", path.display()))
    })?;
    // every local user may connect; authorization happens per request
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
    info!(path = %path.display(), "listening");
    Ok(listener)
}
