//! Moving asset bytes from a URL to a local file

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use seepwatch_core::CancelFlag;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{CloudError, Result};
use crate::scene::SceneAsset;
use crate::stac_client::{backoff_delay, sign_planetary_computer};

/// Downloads one asset to `dest`.
///
/// Implementations must never leave a partial file at `dest`: either the
/// whole asset is there afterwards or nothing is.
#[async_trait]
pub trait AssetTransport: Send + Sync {
    /// Returns the number of bytes written.
    async fn download(&self, asset: &SceneAsset, dest: &Path) -> Result<u64>;
}

/// Sibling path used while a download is in flight
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// HTTP(S) transport with retry and Planetary Computer signing.
///
/// `request_timeout` bounds connecting, waiting for the response headers
/// and each gap between body chunks. A large band that keeps arriving is
/// never cut off, however long it takes.
pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    cancel: CancelFlag,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().connect_timeout(request_timeout).build()?;
        Ok(Self {
            client,
            request_timeout,
            max_retries,
            retry_backoff: Duration::from_millis(500),
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Checked before every attempt, retries included.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancel(&self, stage: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled(stage.to_string()));
        }
        Ok(())
    }

    async fn resolve_href(&self, asset: &SceneAsset) -> Result<String> {
        if asset.requires_signing {
            sign_planetary_computer(&self.client, &asset.href, self.request_timeout).await
        } else {
            Ok(asset.href.clone())
        }
    }

    async fn stream_to(&self, url: &str, part: &Path) -> Result<u64> {
        let stalled = || {
            CloudError::Network(format!(
                "no data from {} for {:?}",
                url, self.request_timeout
            ))
        };

        let resp = timeout(self.request_timeout, self.client.get(url).send())
            .await
            .map_err(|_| stalled())??;
        let status = resp.status();
        if !status.is_success() {
            return Err(CloudError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(part).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = timeout(self.request_timeout, stream.next())
            .await
            .map_err(|_| stalled())?
        {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl AssetTransport for HttpTransport {
    async fn download(&self, asset: &SceneAsset, dest: &Path) -> Result<u64> {
        self.check_cancel("asset download")?;
        let url = self.resolve_href(asset).await?;
        let part = partial_path(dest);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                self.check_cancel("asset download retry")?;
                tokio::time::sleep(backoff_delay(self.retry_backoff, attempt)).await;
                self.check_cancel("asset download retry")?;
            }

            match self.stream_to(&url, &part).await {
                Ok(bytes) => {
                    tokio::fs::rename(&part, dest).await?;
                    debug!("Downloaded {} bytes to {}", bytes, dest.display());
                    return Ok(bytes);
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&part).await;
                    let retry = e.is_transient() && attempt < self.max_retries;
                    warn!(
                        "Download of {} failed (attempt {}): {}{}",
                        asset.href,
                        attempt + 1,
                        e,
                        if retry { ", retrying" } else { "" }
                    );
                    last_err = Some(e);
                    if !retry {
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network(format!("download of {} failed", asset.href))))
    }
}
