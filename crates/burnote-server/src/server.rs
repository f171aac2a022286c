use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use directories::ProjectDirs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    handlers::{create_secret, health, reveal_secret},
    service::{SecretService, ServiceConfig, DEFAULT_TTL_MINUTES, DEFAULT_VIEW_LIMIT},
    store::{
        crypto::{self, EncryptionKey},
        ChaChaCrypto, MemoryStore, RedbStore, SecretStore,
    },
    AppState,
};

/// Which `SecretStore` backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// `burnote.db` in the data directory.
    Redb,
    /// Process memory; everything is gone on restart.
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redb" | "disk" => Ok(Self::Redb),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown storage backend '{other}' (expected redb or memory)"),
        }
    }
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub storage: StorageKind,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
    pub default_view_limit: u32,
    pub default_ttl_minutes: u32,
    /// Passphrase the encryption key is derived from. When unset a random
    /// key is generated and kept in `burnote.key`.
    pub master_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("BURNOTE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("BURNOTE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("BURNOTE_DATA_DIR").ok().map(PathBuf::from),
            storage: std::env::var("BURNOTE_STORAGE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(StorageKind::Redb),
            sweep_interval: Duration::from_secs(
                std::env::var("BURNOTE_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(300),
            ),
            cors_origins: std::env::var("BURNOTE_CORS_ORIGINS").ok(),
            default_view_limit: std::env::var("BURNOTE_DEFAULT_VIEW_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_VIEW_LIMIT),
            default_ttl_minutes: std::env::var("BURNOTE_DEFAULT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_TTL_MINUTES),
            master_key: None,
        }
    }
}

/// Read a master key from a file, trimming surrounding whitespace.
/// Fails if the file cannot be read or is empty after trimming.
pub fn read_key_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read key file: {}", path.display()))?;
    let key = content.trim().to_string();
    if key.is_empty() {
        anyhow::bail!("key file is empty: {}", path.display());
    }
    Ok(key)
}

/// Resolve an optional master passphrase from `BURNOTE_MASTER_KEY_FILE`
/// (preferred) or `BURNOTE_MASTER_KEY`.
pub fn resolve_master_key() -> Result<Option<String>> {
    if let Ok(path) = std::env::var("BURNOTE_MASTER_KEY_FILE") {
        let key = read_key_file(Path::new(&path))?;
        if std::env::var("BURNOTE_MASTER_KEY").is_ok() {
            warn!("both BURNOTE_MASTER_KEY and BURNOTE_MASTER_KEY_FILE are set; using file");
        }
        return Ok(Some(key));
    }
    match std::env::var("BURNOTE_MASTER_KEY") {
        Ok(key) if key.is_empty() => anyhow::bail!("BURNOTE_MASTER_KEY must not be empty"),
        Ok(key) => Ok(Some(key)),
        Err(_) => Ok(None),
    }
}

/// Resolve (and create) the data directory. Without an explicit directory
/// the platform app data dir is used (`~/.local/share/burnote/`, etc.).
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match data_dir {
        Some(d) => d.clone(),
        None => ProjectDirs::from("", "", "burnote")
            .context("could not determine platform data directory")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path).context("create data dir")?;
    Ok(path)
}

/// Build the HTTP router over an already-constructed state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/secrets", post(create_secret))
        .route("/api/secrets/{id}", get(reveal_secret))
        .with_state(state)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let enc_key = load_or_create_key(&data_dir, cfg.master_key.as_deref())?;
    let crypto = Arc::new(ChaChaCrypto::new(enc_key));

    let store: Arc<dyn SecretStore> = match cfg.storage {
        StorageKind::Redb => {
            let db_path = data_dir.join("burnote.db");
            Arc::new(RedbStore::open(&db_path).context("open store")?)
        }
        StorageKind::Memory => {
            warn!("using in-memory storage; secrets will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let service = SecretService::new(
        store,
        crypto,
        ServiceConfig {
            default_view_limit: cfg.default_view_limit,
            default_ttl_minutes: cfg.default_ttl_minutes,
        },
    );

    service.clone().spawn_sweep(cfg.sweep_interval);

    let app = router(AppState { service })
        .layer(build_cors(cfg.cors_origins.as_deref()))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "burnote server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

/// With a master passphrase, derive the key via Argon2id and a persisted
/// salt. Otherwise load (or generate) a random key file.
fn load_or_create_key(data_dir: &Path, master_key: Option<&str>) -> Result<EncryptionKey> {
    if let Some(master_key) = master_key {
        let salt_path = data_dir.join("burnote.salt");
        let salt: [u8; 32] = if salt_path.exists() {
            let bytes = std::fs::read(&salt_path).context("read burnote.salt")?;
            bytes.as_slice().try_into().map_err(|_| {
                anyhow::anyhow!(
                    "burnote.salt is corrupt (expected 32 bytes, got {})",
                    bytes.len()
                )
            })?
        } else {
            let salt = crypto::generate_salt();
            std::fs::write(&salt_path, salt).context("write burnote.salt")?;
            info!("generated new key derivation salt");
            salt
        };
        return crypto::derive_key(master_key, &salt).context("derive encryption key");
    }

    let key_path = data_dir.join("burnote.key");
    if key_path.exists() {
        let bytes = std::fs::read(&key_path).context("read burnote.key")?;
        crypto::load_key(&bytes).ok_or_else(|| {
            anyhow::anyhow!(
                "burnote.key is corrupt (expected 32 bytes, got {})",
                bytes.len()
            )
        })
    } else {
        let key = crypto::generate_key();
        std::fs::write(&key_path, key.as_bytes()).context("write burnote.key")?;
        info!("generated new encryption key");
        Ok(key)
    }
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(?err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
