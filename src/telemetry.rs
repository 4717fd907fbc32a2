use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing. `RUST_LOG` overrides the default `farmhand=info`.
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmhand=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
