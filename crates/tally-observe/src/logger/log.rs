use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::subscriber::set_global_default;
use tracing_subscriber::{EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Build the layer stack for `cfg.format` and install it globally.
pub(super) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let registry = tracing_subscriber::registry().with(mk_filter(&cfg.level)?);

    let installed = match cfg.format {
        LoggerFormat::Text => set_global_default(
            registry.with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_timer(mk_timer()),
            ),
        ),
        LoggerFormat::Json => set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(cfg.with_targets)
                    .with_current_span(true)
                    .with_timer(mk_timer()),
            ),
        ),
        LoggerFormat::Journald => return install_journald(registry),
    };
    // Setting the global default only fails when one is already in place.
    installed.map_err(|_| LoggerError::AlreadyInitialized)
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|e| LoggerError::InvalidLogLevel {
        directive: level.to_string(),
        reason: e.to_string(),
    })
}

/// RFC 3339 timestamps in the host's local offset, UTC when it cannot be read.
fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn install_journald<S>(registry: S) -> Result<(), LoggerError>
where
    S: tracing::Subscriber
        + for<'a> tracing_subscriber::registry::LookupSpan<'a>
        + Send
        + Sync
        + 'static,
{
    let journald = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?;
    set_global_default(registry.with(journald)).map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn install_journald<S>(_registry: S) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
