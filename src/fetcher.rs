use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;

/// Downloads remote job inputs to local files.
///
/// One attempt per call, no retries. There is no deadline on the whole
/// download; a transfer only fails when the remote stops sending for longer
/// than the idle timeout.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(idle_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(idle_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Stream `url` into `dest`. Returns `false` on any network error,
    /// non-success status or write failure.
    pub async fn fetch(&self, url: &str, dest: &Path) -> bool {
        tracing::info!(url, "Trying to download");
        match self.try_fetch(url, dest).await {
            Ok(bytes) => {
                tracing::info!(url, bytes, "Download success");
                true
            }
            Err(e) => {
                tracing::info!(url, error = %e, "Download failed");
                false
            }
        }
    }

    async fn try_fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
