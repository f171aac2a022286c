use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use burnote_server::StorageKind;
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "burnote", about = "burnote: secrets that burn after reading", version)]
struct Cli {
    /// burnote server URL (default: http://localhost:8080 or $BURNOTE_SERVER)
    #[arg(long, env = "BURNOTE_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the burnote HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, env = "BURNOTE_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind
        #[arg(long, env = "BURNOTE_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Directory holding burnote.db and key material
        #[arg(long, env = "BURNOTE_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Storage backend: redb or memory
        #[arg(long, env = "BURNOTE_STORAGE", default_value = "redb")]
        storage: StorageKind,
    },
    /// Store a secret and print its id
    Create {
        /// Secret text; read from stdin when omitted
        text: Option<String>,
        /// Number of views before the secret self-destructs
        #[arg(long)]
        views: Option<u32>,
        /// Time to live, e.g. 30m, 2h, 7d
        #[arg(long)]
        ttl: Option<String>,
    },
    /// Reveal a secret by id (consumes one view)
    Reveal {
        /// Secret id
        id: String,
    },
    /// Print the shareable URL for a secret id
    Share {
        /// Secret id
        id: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BURNOTE_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            data_dir,
            storage,
        } => cmd_serve(host, port, data_dir, storage).await,

        Commands::Create { text, views, ttl } => {
            cmd_create(&cli.server, text, views, ttl.as_deref()).await
        }

        Commands::Reveal { id } => cmd_reveal(&cli.server, &id).await,

        Commands::Share { id } => {
            println!("{}", share_url(&cli.server, &id));
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(
    host: String,
    port: u16,
    data_dir: Option<PathBuf>,
    storage: StorageKind,
) -> Result<()> {
    let cfg = burnote_server::ServerConfig {
        host,
        port,
        data_dir,
        storage,
        master_key: burnote_server::resolve_master_key()?,
        ..Default::default()
    };

    burnote_server::run(cfg).await
}

async fn cmd_create(
    server: &str,
    text: Option<String>,
    views: Option<u32>,
    ttl: Option<&str>,
) -> Result<()> {
    let text = match text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
                .context("read secret from stdin")?;
            buf.trim_end_matches(['\r', '\n']).to_owned()
        }
    };
    if text.is_empty() {
        anyhow::bail!("secret text must not be empty");
    }

    let expiration = ttl.map(parse_ttl_minutes).transpose()?;

    let body = serde_json::json!({
        "text": text,
        "viewLimit": views,
        "expiration": expiration,
    });

    let resp = Client::new()
        .post(format!("{}/api/secrets", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {}", error_message(&json));
    }

    let id = json["data"]["id"]
        .as_str()
        .context("response did not contain an id")?;
    println!("{id}");
    eprintln!("share: {}", share_url(server, id));
    Ok(())
}

async fn cmd_reveal(server: &str, id: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{}/api/secrets/{}", server.trim_end_matches('/'), id))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if status.is_success() {
        println!("{}", json["data"].as_str().unwrap_or(""));
        Ok(())
    } else {
        anyhow::bail!("{}", error_message(&json));
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn share_url(server: &str, id: &str) -> String {
    format!("{}/api/secrets/{}", server.trim_end_matches('/'), id)
}

fn error_message(json: &Value) -> &str {
    json["message"].as_str().unwrap_or("unknown error")
}

/// Parse human duration strings like "90m", "2h", "7d" into whole minutes.
fn parse_ttl_minutes(s: &str) -> Result<u64> {
    let d: Duration = s
        .parse::<humantime::Duration>()
        .with_context(|| format!("invalid duration: {s}"))?
        .into();
    let minutes = d.as_secs() / 60;
    if minutes == 0 {
        anyhow::bail!("ttl must be at least one minute: {s}");
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_parses_to_minutes() {
        assert_eq!(parse_ttl_minutes("90m").unwrap(), 90);
        assert_eq!(parse_ttl_minutes("2h").unwrap(), 120);
        assert_eq!(parse_ttl_minutes("1d").unwrap(), 1440);
        assert!(parse_ttl_minutes("30s").is_err());
        assert!(parse_ttl_minutes("soon").is_err());
    }

    #[test]
    fn share_url_trims_trailing_slash() {
        assert_eq!(
            share_url("http://localhost:8080/", "abc"),
            "http://localhost:8080/api/secrets/abc"
        );
    }
}
