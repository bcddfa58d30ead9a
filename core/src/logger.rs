//----------------------------------------------------------------------------------------- std lib
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;
//--------------------------------------------------------------------------------- other libraries
use log::info;
use tracing_subscriber::layer::SubscriberExt;

/// The [`Instant`] the process started logging.
static INIT_INSTANT: OnceLock<Instant> = OnceLock::new();

fn init_instant() -> Instant {
    *INIT_INSTANT.get_or_init(Instant::now)
}

/// Returns the seconds since logging was initialized.
#[must_use]
#[inline]
pub fn uptime() -> u64 {
    init_instant().elapsed().as_secs()
}

//---------------------------------------------------------------------------------------------------- Logger init function
/// Initializes the logger.
///
/// Functionality is provided by [`log`] + [`env_logger`]. When `RUST_LOG` is
/// unset, all library crate logs are disabled except for evermix and its
/// sub-crates, which log at `filter`.
///
/// # Panics
/// This must only be called _once_.
#[allow(clippy::missing_inline_in_public_items)]
pub fn init_logger(filter: log::LevelFilter) {
    // Initialize timer.
    let now = init_instant();

    let mut builder = env_logger::Builder::new();
    builder.format(move |buf, record| {
        let level = match record.level() {
            log::Level::Error => "E",
            log::Level::Warn => "W",
            log::Level::Info => "I",
            log::Level::Debug => "D",
            log::Level::Trace => "T",
        };
        writeln!(
            buf,
            "| {} | {: >9.3} | {: >28} @ {: <4} | {}",
            level,
            now.elapsed().as_secs_f32(),
            record.file_static().unwrap_or("???"),
            record.line().unwrap_or(0),
            record.args(),
        )
    });

    match std::env::var("RUST_LOG") {
        Ok(env) => {
            builder.parse_filters(&env);
            builder.init();
            info!("Log Level (RUST_LOG) ... {env}");
        }
        _ => {
            builder.filter_level(log::LevelFilter::Off);
            for module in ["evermix_analysis", "evermix_core", "evermix_cli"] {
                builder.filter_module(module, filter);
            }
            builder.init();
            info!("Log Level (Flag) ... {filter}");
        }
    }
}

/// Build the tracing subscriber used for span-level diagnostics.
///
/// The caller decides whether to install it globally.
#[must_use]
#[allow(clippy::missing_inline_in_public_items)]
pub fn init_tracing() -> impl tracing::Subscriber + Send + Sync {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
}
