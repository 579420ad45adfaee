use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use nmap_api_rs::{logging, server};

/// nmap-api-rs: HTTP API around nmap with normalized JSON results and a persistent scan history.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nmap-api-rs",
    version,
    about = "HTTP API around nmap with normalized JSON results and a persistent scan history.",
    long_about = None
)]
struct Cli {
    /// Address the HTTP server listens on.
    #[arg(long, env = "NMAP_API_BIND", default_value = "127.0.0.1:5000")]
    bind: String,

    /// JSON file holding the scan history (created on first save).
    #[arg(long = "history-file", env = "NMAP_API_HISTORY_FILE", default_value = "scan_history.json")]
    history_file: PathBuf,

    /// nmap executable to run.
    #[arg(long = "nmap-path", env = "NMAP_API_NMAP_PATH", default_value = "nmap")]
    nmap_path: PathBuf,

    /// Options used when a scan request omits them.
    #[arg(
        long = "default-options",
        env = "NMAP_API_DEFAULT_OPTIONS",
        default_value = "-sV",
        allow_hyphen_values = true
    )]
    default_options: String,

    /// Directory of static UI files served for paths outside the API.
    #[arg(long = "ui-dir", env = "NMAP_API_UI_DIR")]
    ui_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long = "log-json", default_value_t = false)]
    log_json: bool,
}

impl From<Cli> for server::ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            bind: cli.bind,
            history_file: cli.history_file,
            nmap_path: cli.nmap_path,
            default_options: cli.default_options,
            ui_dir: cli.ui_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_json);

    info!(
        bind = %cli.bind,
        history_file = %cli.history_file.display(),
        nmap = %cli.nmap_path.display(),
        default_options = %cli.default_options,
        ui_dir = ?cli.ui_dir,
        "nmap-api-rs configuration"
    );

    server::spawn_server(cli.into()).await
}
