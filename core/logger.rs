// Logger bootstrap for the binaries and tests. Library code only uses the
// `log` macros; RUST_LOG overrides the default filter.
use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

pub fn initialize_logger() {
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();

        builder
            .filter_level(LevelFilter::Warn)
            .filter_module("sockreq_client", LevelFilter::Info)
            .filter_module("sockreq_transport", LevelFilter::Info)
            .filter_module("sockreq_server", LevelFilter::Info)
            .format_timestamp_millis()
            .parse_default_env();

        // Another crate may already have installed a logger
        let _ = builder.try_init();
    });
}
