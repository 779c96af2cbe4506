//! API module for the game scout
//!
//! Upload a video over HTTP and get the scouting report back as JSON.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::pipeline::PipelineOrchestrator;

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{build_router, AppState};

/// API server wrapping one shared orchestrator
pub struct ApiServer {
    state: AppState,
    addr: SocketAddr,
}

impl ApiServer {
    /// FFmpeg source and configured backend behind `addr`
    pub async fn from_config(config: &Config, addr: SocketAddr) -> Result<Self> {
        let orchestrator = PipelineOrchestrator::from_config(config).await?;
        Ok(Self::new(Arc::new(orchestrator), config, addr))
    }

    pub fn new(orchestrator: Arc<PipelineOrchestrator>, config: &Config, addr: SocketAddr) -> Self {
        Self {
            state: AppState {
                orchestrator,
                window: config.sampling.window(),
            },
            addr,
        }
    }

    /// Start the API server in the background
    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.start().await })
    }

    /// Start the API server
    pub async fn start(self) -> Result<()> {
        info!("🚀 Starting API server on {}", self.addr);
        server::start_http_server(self.state, self.addr).await
    }
}
