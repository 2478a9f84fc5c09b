//! # SeepWatch Cloud
//!
//! Sentinel-2 imagery acquisition for pipeline leak detection.
//!
//! - [`CatalogClient`]: searches an ordered list of STAC providers and
//!   returns the first non-empty result, closest acquisition first
//! - [`Fetcher`]: idempotent, bounded-concurrency asset downloads into a
//!   date/scene keyed directory layout
//! - [`Ingestor`]: search-and-fetch with whole-sequence retries and
//!   exponential backoff
//!
//! ## Features
//!
//! - `native` (default): blocking API owning a Tokio runtime

pub mod catalog;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod provider;
pub mod scene;
pub mod stac_client;
pub mod stac_models;
pub mod transport;

#[cfg(feature = "native")]
pub mod blocking;

#[cfg(test)]
mod test_server;

pub use catalog::CatalogClient;
pub use error::{CloudError, Result};
pub use fetcher::{FetchOptions, FetchOutcome, FetchedAsset, Fetcher};
pub use ingest::{IngestOptions, IngestReport, Ingestor};
pub use provider::{CatalogProvider, CloudFilter, StacProvider};
pub use scene::{SceneAsset, SceneQuery, SceneReference};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
pub use transport::{AssetTransport, HttpTransport};
