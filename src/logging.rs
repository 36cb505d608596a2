//! Tracing subscriber setup.
//!
//! All diagnostic output goes to stderr. `RUST_LOG` overrides the default
//! filter.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: our crates at info, noisy deps at warn.
pub const DEFAULT_FILTER: &str = "vigil=info,vigil_lookup=info,hyper=warn,reqwest=warn";

/// Install the global fmt subscriber.
///
/// Safe to call more than once; later calls are no-ops. Returns `true` when
/// this call installed the subscriber.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn init_is_idempotent() {
        let _ = init();
        assert!(!init(), "second init must not install another subscriber");
    }
}
