//! Logging utilities

use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

/// Crates which are far too chatty below `warn`
const QUIET: [&str; 2] = ["x11rb=warn", "x11rb_protocol=warn"];

/// Install the global subscriber, filtered by `VOLTRAY_LOG`
pub fn parse_log_level() {
    let base = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("VOLTRAY_LOG")
        .from_env_lossy();

    let filter = QUIET
        .iter()
        .filter_map(|d| d.parse().ok())
        .fold(base, EnvFilter::add_directive);

    fmt().with_env_filter(filter).init();
    info!("Initialised logger: welcome to voltray!");
}

/// Create an oops (a fatal crash) with an associated error message
pub fn oops<S: Into<String>>(msg: S, code: u16) -> ! {
    error!("{}", msg.into());
    std::process::exit(code.into());
}
