// =============================================================================
// Binance Futures Long/Short Imbalance Reporter
// =============================================================================
//
// Reads the daily long/short ratio feeds of USDT-margined perpetuals, scores
// how one-sided positioning is, and reports the result to Telegram.
//
// Two entry points share this library:
//   - `imbalance-report`  fixed pair list from settings
//   - `find-imbalanced`   top symbols by 24h volume, highlighted pairs only
// =============================================================================

pub mod binance;
pub mod collector;
pub mod futures_intel;
pub mod proxy;
pub mod report;
pub mod runner;
pub mod selector;
pub mod settings;
pub mod telegram;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle to the global log filter installed by [`init_tracing`].
pub struct TracingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl TracingHandle {
    /// Re-apply the filter once settings are known.  `RUST_LOG` still wins.
    pub fn set_debug(&self, debug: bool) {
        if let Err(e) = self.filter.reload(log_filter(debug)) {
            tracing::warn!(error = %e, "failed to update log filter");
        }
    }
}

/// Install the global fmt subscriber on stderr at the default level, so
/// settings loading is already logged.  Call [`TracingHandle::set_debug`]
/// once the settings are loaded.
pub fn init_tracing() -> TracingHandle {
    let (filter, handle) = reload::Layer::new(log_filter(false));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
    TracingHandle { filter: handle }
}

fn fallback_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn log_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_directive(debug)))
}
