use tokio::sync::RwLock;
use tracing::{debug, trace};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Log lines go to stderr, which leaves stdout to what the machine says.
fn do_init() {
    #[allow(unused_mut)]
    let mut message = String::from("Logging with: stderr");

    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    #[cfg(feature = "use-tracy")]
    let registry = {
        use tracing::metadata::LevelFilter;

        message += ", tracy";

        registry.with(tracing_tracy::TracyLayer::new().with_filter(LevelFilter::DEBUG))
    };

    registry.init();

    debug!(message);
}

/// Initialize tracing.
///
/// Will only initialize once, so tests may call this.
pub async fn init() {
    static TRACING_IS_INITIALIZED: RwLock<bool> = RwLock::const_new(false);

    let initialized = { *TRACING_IS_INITIALIZED.read().await };

    if !initialized {
        let mut initialized = TRACING_IS_INITIALIZED.write().await;

        // To avoid race condition between the `.read()` and the
        // `.write()`.
        if *initialized {
            return;
        }

        do_init();

        *initialized = true;
    }
}

/// Call before exiting.
pub fn shutdown() {
    trace!("Shutting down");
}
