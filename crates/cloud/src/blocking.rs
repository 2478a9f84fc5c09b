//! Blocking (synchronous) API for native platforms.
//!
//! Wraps the async [`Ingestor`] and [`CatalogClient`] with a Tokio runtime so
//! callers don't need to manage their own async runtime.

use chrono::NaiveDate;
use seepwatch_core::{AreaOfInterest, CancelFlag};
use tracing::warn;

use crate::catalog::CatalogClient;
use crate::error::{CloudError, Result};
use crate::ingest::{IngestReport, Ingestor};
use crate::scene::{SceneQuery, SceneReference};

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| CloudError::Network(format!("failed to start async runtime: {e}")))
}

/// Blocking wrapper around [`Ingestor`].
pub struct IngestorBlocking {
    rt: tokio::runtime::Runtime,
    inner: Ingestor,
}

impl IngestorBlocking {
    pub fn new(inner: Ingestor) -> Result<Self> {
        Ok(Self {
            rt: runtime()?,
            inner,
        })
    }

    /// Search and download imagery around `target` (blocking).
    pub fn ingest(&self, aoi: &AreaOfInterest, target: NaiveDate) -> Result<IngestReport> {
        self.rt.block_on(self.inner.ingest(aoi, target))
    }
}

/// One-shot catalog search (blocking).
pub fn search(catalog: &CatalogClient, query: &SceneQuery) -> Result<Vec<SceneReference>> {
    runtime()?.block_on(catalog.search(query))
}

/// Request cancellation through `cancel` on the first Ctrl-C.
///
/// Work stops at the next checkpoint (a stage boundary or a network retry).
/// A second Ctrl-C exits the process with status 130.
pub fn cancel_on_interrupt(cancel: CancelFlag) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("seepwatch-interrupt".into())
        .spawn(move || {
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupted; stopping at the next checkpoint (Ctrl-C again to abort)");
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            })
        })?;
    Ok(())
}
