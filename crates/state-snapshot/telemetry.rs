use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` registry driven by `RUST_LOG`, falling
/// back to `info` when unset. Mirrors the ambient logging setup of the
/// binaries this core feeds; the library itself never calls this on its
/// own, only a caller's `main` does.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
