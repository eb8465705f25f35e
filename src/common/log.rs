//! Logging setup
//!
//! Thin wrapper around `env_logger` so the binary and the tests initialize
//! the logger the same way.

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over the provided level.
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    // try_init so repeated calls from tests are harmless
    let _ = env_logger::Builder::from_env(env).try_init();
}
