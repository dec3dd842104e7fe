//! Tracing subscriber setup

use pkgd_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor `--debug` is set
fn default_filter(level: &str) -> String {
    format!("{level},pkgd::events={level},pkgd::lock::audit=info")
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over everything; `--debug` forces debug; otherwise the
/// configured level applies. Logs go to stderr so the service manager's
/// journal picks them up.
pub fn init_tracing(config: &LoggingConfig, debug: bool, json: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(default_filter(&config.level)).unwrap_or_else(|e| {
            eprintln!("Warning: invalid log level {:?}: {e}", config.level);
            EnvFilter::new("info")
        })
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = if json || config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("Warning: logging already initialized: {e}");
    }
}
