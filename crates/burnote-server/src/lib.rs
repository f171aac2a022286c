pub mod error;
pub mod handlers;
pub mod server;
pub mod service;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: service::SecretService,
}

pub use error::SecretError;
pub use server::{
    read_key_file, resolve_data_dir, resolve_master_key, router, run, ServerConfig, StorageKind,
};
pub use service::{Clock, SecretService, ServiceConfig, SystemClock};
