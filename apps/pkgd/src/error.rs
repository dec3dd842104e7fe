//! Daemon error handling

use std::fmt;

use pkgd_errors::UserFacingError;

/// Errors that stop the daemon
#[derive(Debug)]
pub enum DaemonError {
    /// Configuration, engine or other service error
    Service(pkgd_errors::Error),
    /// Socket or runtime setup failed
    Setup(String),
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Service(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                Ok(())
            }
            DaemonError::Setup(msg) => write!(f, "Setup error: {msg}"),
            DaemonError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Service(e) => Some(e),
            DaemonError::Io(e) => Some(e),
            DaemonError::Setup(_) => None,
        }
    }
}

impl From<pkgd_errors::Error> for DaemonError {
    fn from(e: pkgd_errors::Error) -> Self {
        DaemonError::Service(e)
    }
}

impl From<pkgd_errors::EngineError> for DaemonError {
    fn from(e: pkgd_errors::EngineError) -> Self {
        DaemonError::Service(e.into())
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(e: std::io::Error) -> Self {
        DaemonError::Io(e)
    }
}
