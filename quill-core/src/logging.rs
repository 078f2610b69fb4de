use tracing_subscriber::EnvFilter;

/// Install the process-wide fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g.
/// `"quill_posts=info,quill_blob=info"`) is used. Safe to call more than once.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init();
}
