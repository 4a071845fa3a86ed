pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use crate::infra::{cache::Cache, db::Db, queue::TaskQueue};

/// Shared handler state. Cache and queue are trait objects so tests (and
/// alternative deployments) can substitute in-process implementations.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: Arc<dyn Cache>,
    pub queue: Arc<dyn TaskQueue>,
    pub token_key: [u8; 32],
    pub token_ttl_hours: u64,
}
