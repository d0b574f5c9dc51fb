//! Logging for the upgrade listener, the upgrade host and connections
//!
//! Warnings report rejected upgrade requests (with the HTTP status sent) and
//! frames a connection skips; errors report failed hijacks, early client
//! data, handshake write failures and host accept failures. Ping, pong and
//! close traffic is logged at debug level.
//!
//! With the `logging` feature the macros forward to `tracing`; without it,
//! errors and warnings go to stderr and debug output is discarded.

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::error!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!("[ERROR] {}", format!($($arg)*));
        }
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::warn!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!("[WARN] {}", format!($($arg)*));
        }
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::info!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            if false {
                let _ = format!($($arg)*);
            }
        }
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::debug!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            if false {
                let _ = format!($($arg)*);
            }
        }
    };
}

/// Initialize logging subsystem
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
#[cfg(feature = "logging")]
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Initialize logging subsystem (no-op when logging feature is disabled)
#[cfg(not(feature = "logging"))]
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    Ok(())
}
