use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Installs the global subscriber. `DEBUG_DELIVERY=true` raises this crate
/// to debug regardless of `LOG_LEVEL`.
pub fn init(config: &Config) {
    let mut directives = config.log_level.clone();
    if config.debug {
        directives.push_str(",courier_gateway=debug");
    }
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if config.log_json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    if let Err(err) = installed {
        eprintln!("tracing subscriber already installed: {err}");
    }
}
