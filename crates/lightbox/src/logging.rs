//! Logging setup for the CLI.
//!
//! Events go to stderr through `tracing`; stdout stays reserved for the
//! manifest. The level comes from the config file, bumped to `debug` by
//! `--verbose`, and `RUST_LOG` overrides both when set.

use lightbox_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber from the config plus CLI overrides.
pub fn init(config: &Config, verbose: bool, json_logs: bool) {
    let level = if verbose { "debug" } else { &config.logging.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs || config.logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
