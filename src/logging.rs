use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "media_ingest=info";

fn filter_directive(ingest_log: Option<String>, rust_log: Option<String>) -> String {
    [ingest_log, rust_log]
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the stderr subscriber. `INGEST_LOG` wins over `RUST_LOG`.
pub fn init() {
    let directive = filter_directive(env::var("INGEST_LOG").ok(), env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
