use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global flag to control per-frame debug logging
pub static MIC_DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

static TRACING_INIT: Once = Once::new();

/// Set per-frame debug logging on/off
pub fn set_mic_debug(enabled: bool) {
    MIC_DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
    tracing::info!("Mic debug logging {}", if enabled { "ENABLED" } else { "DISABLED" });
}

/// Check if per-frame debug logging is enabled
pub fn is_mic_debug_enabled() -> bool {
    MIC_DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Install the tracing subscriber. `RUST_LOG` wins over the default filter.
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "voicehub_mic_lib=info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

/// Hot-path debug macro - only logs if mic debug is enabled
#[macro_export]
macro_rules! mic_debug {
    ($($arg:tt)*) => {
        if $crate::log::MIC_DEBUG_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::debug!($($arg)*);
        }
    };
}
