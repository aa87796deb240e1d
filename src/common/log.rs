//! Logging helpers
//!
//! `RUST_LOG` takes precedence over the configured level.

/// Initialize the logger
///
/// # Parameters
///
/// * `level` - Default log level filter, e.g. `info` or `ws_protobuf_proxy=debug`
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second call (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_twice() {
        init_logger("debug");
        init_logger("info");
    }
}
