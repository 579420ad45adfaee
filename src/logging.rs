use tracing_subscriber::EnvFilter;

/// Environment variable consulted when `RUST_LOG` is not set.
pub const LOG_ENV: &str = "NMAP_API_LOGLEVEL";

const DEFAULT_FILTER: &str = "nmap_api_rs=info,tower_http=info";

/// Install the global tracing subscriber, writing to stderr as text or JSON lines.
pub fn init_tracing(json: bool) {
    let directives = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
