use once_cell::sync::Lazy;

static TRACING: Lazy<()> = Lazy::new(syncbridge::init_tracing);

/// Installs the tracing subscriber once for the whole test binary.
pub fn init_tracing() {
    Lazy::force(&TRACING);
}
