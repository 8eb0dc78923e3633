// ABOUTME: Shared logging setup for triton binaries
// ABOUTME: Logs always go to stderr so stdout stays clean for headers and signatures

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Logging to stderr at `default_level`, RUST_LOG override.
pub fn init(default_level: Level) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();
}

/// Crate-filtered logging to stderr. `crate_name` logs at `level`, everything else at WARN.
/// Used by the signing CLI with `--verbose`.
pub fn init_for(crate_name: &str, level: Level) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(crate_filter(crate_name, level))
        .init();
}

fn crate_filter(crate_name: &str, level: Level) -> EnvFilter {
    let filter = EnvFilter::from_default_env().add_directive(Level::WARN.into());
    match format!("{crate_name}={level}").parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}
