use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber for the whole process.
///
/// `RUST_LOG` wins over `default_directive` when set. Does nothing if a global
/// subscriber is already installed.
///
/// Basic usage:
///
/// ```
/// fauna_rs::init_tracing("fauna_rs=info");
/// fauna_rs::init_tracing("fauna_rs=debug");
/// ```
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true)
        .try_init();
}
