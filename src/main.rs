//! Sheets server binary
//!
//! Multi-user spreadsheet server speaking framed JSON over TCP.

use std::path::PathBuf;

use clap::Parser;
use royalbit_sheets::server::{ServerConfig, SheetServer};

#[derive(Parser, Debug)]
#[command(name = "sheets-server")]
#[command(version)]
#[command(author = "RoyalBit Inc. <admin@royalbit.ca>")]
#[command(about = "Sheets Server - multi-user spreadsheet store with live broadcast")]
#[command(long_about = r#"
Sheets Server - multi-user, server-authoritative spreadsheet store

Clients connect over TCP and exchange JSON records terminated by a blank line:
  - open    - log in (first login registers the user) and attach to a sheet
  - edit    - set a cell's contents and dependencies
  - revert  - restore a cell's previous value
  - undo    - roll back the most recent edit on the sheet
  - admin   - become the admin observer (users, sheets, shutdown)

Edits that would create a circular dependency are rejected; every accepted
edit is broadcast to all clients viewing the same sheet. Changed sheets are
saved in the background.

Example usage:
  sheets-server                              # Listen on 0.0.0.0:2112
  sheets-server --port 4000 --data-dir /var/lib/sheets
  sheets-server --config sheets.yaml
"#)]
struct Args {
    /// YAML config file (host, port, data_dir, save_interval_secs)
    #[arg(short, long, env = "SHEETS_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to
    #[arg(short = 'H', long, env = "SHEETS_HOST")]
    host: Option<String>,

    /// Port to listen on [default: 2112]
    #[arg(short, long, env = "SHEETS_PORT")]
    port: Option<u16>,

    /// Directory for sheet records, the sheet index and credentials
    #[arg(short, long, env = "SHEETS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds between background saves of changed sheets
    #[arg(short, long, env = "SHEETS_SAVE_INTERVAL")]
    save_interval: Option<u64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_yaml_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(secs) = self.save_interval {
            config.save_interval_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheets_server=info,royalbit_sheets=info".into()),
        )
        .init();

    let config = Args::parse().into_config()?;
    let server = SheetServer::bind(&config).await?;
    server.run().await?;
    Ok(())
}
