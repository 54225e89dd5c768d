//! Background services management

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub mod indexer;
pub mod media;
pub mod watcher;

use indexer::Indexer;
use watcher::RootWatcher;

/// Container for the background services of one catalog root
pub struct Services {
    /// File system watcher for the catalog root
    pub watcher: Arc<RootWatcher>,
}

impl Services {
    /// Create new services container
    pub fn new(indexer: Arc<Indexer>) -> Self {
        info!("Initializing background services");

        let watcher = Arc::new(RootWatcher::new(indexer));

        Self { watcher }
    }

    /// Start all services
    pub async fn start_all(&self) -> Result<()> {
        info!("Starting all background services");

        self.watcher.start().await?;

        Ok(())
    }

    /// Stop all services gracefully
    pub async fn stop_all(&self) -> Result<()> {
        info!("Stopping all background services");

        self.watcher.stop().await?;

        Ok(())
    }
}

/// Trait for background services
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Start the service
    async fn start(&self) -> Result<()>;

    /// Stop the service gracefully
    async fn stop(&self) -> Result<()>;

    /// Check if the service is running
    fn is_running(&self) -> bool;

    /// Get service name for logging
    fn name(&self) -> &'static str;
}
