//! utilities used for testing
//!
//! NOTE: synthetic-analysis builders live in the `evermix_analysis` crate
//! behind its `test_utils` feature flag.

use std::sync::OnceLock;

use crate::logger::{init_logger, init_tracing};

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize the logger and tracing subscriber.
///
/// # Panics
///
/// Panics if the tracing subscriber cannot be installed.
#[allow(clippy::missing_inline_in_public_items)]
pub fn init() {
    INIT.get_or_init(|| {
        init_logger(log::LevelFilter::Debug);
        if let Err(e) = tracing::subscriber::set_global_default(init_tracing()) {
            panic!("Error setting global default tracing subscriber: {e:?}")
        }
    });
}
