//! Command-line access to a WebDAV backup target
//!
//! Usage: clouddav [--address URL] [--username USER] [--password PW] <command>
//!
//! Connection options fall back to the WEBDAV_* environment variables
//! (and a `.env` file) when not given on the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use clouddav::services::webdav::common::fix_slash;
use clouddav::{DavConfig, StorageBackend, WebDavBackend};

#[derive(Parser)]
#[command(name = "clouddav")]
#[command(version, about = "Inspect and transfer files on a WebDAV backup target")]
struct Args {
    /// Server address, e.g. https://dav.example.com/remote.php/dav
    #[arg(long)]
    address: Option<String>,

    /// Port, replacing any port in the address
    #[arg(long)]
    port: Option<u16>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// Directory on the server all paths are relative to
    #[arg(short, long)]
    bucket: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the server and credentials
    Check,
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show one file or directory
    Stat { path: String },
    /// Create a directory and any missing parents
    Mkdir { path: String },
    /// Delete a file or directory tree
    Rm { path: String },
    /// Download a remote file
    Get { remote: String, local: PathBuf },
    /// Upload a local file
    Put { local: PathBuf, remote: String },
}

impl Args {
    fn config(&self) -> Result<DavConfig> {
        let mut config = match DavConfig::from_env() {
            Ok(config) => config,
            Err(_) if self.address.is_some() => DavConfig::new("", "", ""),
            Err(e) => return Err(e).context("No server address: pass --address or set WEBDAV_ADDRESS"),
        };

        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = timeout;
        }
        if self.insecure {
            config.insecure_skip_verify = true;
        }

        config.validate().context("Invalid WebDAV configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.config()?;
    let backend = WebDavBackend::new(&config).await?;
    let client = backend.client();

    match args.command {
        Command::Check => {
            info!("🎉 {} is reachable with the configured credentials", client.root());
        }
        Command::Ls { path } => {
            for file in client.read_dir(&backend.remote_path(&path)).await? {
                println!("{}", file);
            }
        }
        Command::Stat { path } => {
            println!("{}", client.stat(&backend.remote_path(&path)).await?);
        }
        Command::Mkdir { path } => {
            let remote = fix_slash(&backend.remote_path(&path));
            client.mkdir_all(&remote).await?;
            info!("📁 {} is ready", remote);
        }
        Command::Rm { path } => {
            backend.delete(&path).await?;
            info!("🗑️ Removed {}", backend.remote_path(&path));
        }
        Command::Get { remote, local } => {
            backend.download(&remote, &local).await?;
        }
        Command::Put { local, remote } => {
            backend.upload(&local, &remote).await?;
        }
    }

    Ok(())
}
