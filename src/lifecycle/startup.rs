//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the route table from the registered controllers
//! - Prepare the upload destination
//! - Start the server and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any build error stops startup before the socket is bound
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use crate::config::AppConfig;
use crate::http::server::{Server, ServerError};
use crate::lifecycle::Shutdown;
use crate::observability::ErrorReporter;
use crate::routing::{BuildError, RouteTableBuilder};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("route table build failed: {0}")]
    Build(#[from] BuildError),

    #[error("upload directory {path} is not usable: {source}")]
    UploadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Build everything and serve until `shutdown` triggers.
pub async fn launch(
    config: AppConfig,
    builder: RouteTableBuilder,
    reporter: Arc<dyn ErrorReporter>,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    // 1. Route table
    let table = builder
        .upload_config(config.upload.clone())
        .reporter(Arc::clone(&reporter))
        .build()?;

    // 2. Upload destination, as the table writes it
    let dest = table.upload_config().dest.clone();
    tokio::fs::create_dir_all(&dest)
        .await
        .map_err(|source| StartupError::UploadDir { path: dest.clone(), source })?;

    // 3. Listener
    Server::new(config, table)
        .reporter(reporter)
        .start(shutdown.wait())
        .await?;

    Ok(())
}
