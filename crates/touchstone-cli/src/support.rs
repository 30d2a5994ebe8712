use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Route log records to stderr at a level selected by the `-v` count:
/// warnings by default, info at `-v`, debug at `-vv`. `RUST_LOG` overrides
/// the flag when set.
pub fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}
