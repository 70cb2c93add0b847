//! Logging setup shared by the CLI and the server binary

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` directives win; otherwise `level`
/// (from `Config::log_level`) applies. Calling it twice is a no-op.
pub fn init_tracing(level: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_line_number(verbose)
        .try_init()
        .is_ok();

    if installed {
        debug!(level, "tracing initialised");
    }
}
