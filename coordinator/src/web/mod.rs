// File: coordinator/src/web/mod.rs
pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::config::Config;
use crate::stages::StageRunner;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub runner: StageRunner,
}

impl AppState {
    pub fn new(config: Arc<Config>, runner: StageRunner) -> Self {
        Self { config, runner }
    }
}
