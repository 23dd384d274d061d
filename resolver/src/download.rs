// Copyright 2018 Alex Crawford
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Concurrent, all-or-nothing batch file fetching.

use crate::errors::ResolverError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Progress notification: url, destination, bytes read so far. Invoked from
/// worker tasks; must tolerate concurrent invocation.
pub type ProgressCallback = Arc<dyn Fn(&Url, &Path, u64) + Send + Sync>;

/// Fetches a batch of (url, destination) pairs, concurrently, all-or-nothing.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download every `(url, destination)` pair. On any single failure, every
    /// destination in the batch is removed and the whole operation fails
    /// with `NotFound`. A partially written file never appears at its
    /// destination path; each file is written to a sibling temp path and
    /// renamed into place only once fully downloaded.
    async fn get_files(&self, files: &[(Url, PathBuf)]) -> Result<(), ResolverError>;
}

/// Default `Downloader` backed by `reqwest`, with a bounded concurrent
/// worker pool and an optional progress callback.
pub struct ReqwestDownloader {
    client: Client,
    concurrency: usize,
    timeout: Option<Duration>,
    progress: Option<ProgressCallback>,
}

impl ReqwestDownloader {
    /// Build a downloader with `concurrency` simultaneous in-flight
    /// requests and a per-request `timeout` (`None` for unbounded).
    pub fn new(concurrency: usize, timeout: Option<Duration>) -> crate::errors::Fallible<Self> {
        let mut builder = Client::builder().gzip(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(ReqwestDownloader {
            client: builder.build()?,
            concurrency: concurrency.max(1),
            timeout,
            progress: None,
        })
    }

    /// Attach a progress callback, invoked from worker tasks as downloads
    /// make headway.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    async fn fetch_one(&self, url: &Url, dst: &Path) -> crate::errors::Fallible<()> {
        let parent = dst.parent().ok_or_else(|| anyhow::anyhow!("destination has no parent directory"))?;
        tokio::fs::create_dir_all(parent).await?;

        let tmp = sibling_temp_path(dst);
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut stream = response.bytes_stream();
        let mut read = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            read += chunk.len() as u64;
            if let Some(progress) = &self.progress {
                progress(url, dst, read);
            }
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, dst).await?;
        Ok(())
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn get_files(&self, files: &[(Url, PathBuf)]) -> Result<(), ResolverError> {
        let _ = self.timeout; // honored via the per-client builder above.

        let result = stream::iter(files.iter().map(Ok::<_, anyhow::Error>))
            .try_for_each_concurrent(self.concurrency, |(url, dst)| async move {
                self.fetch_one(url, dst).await
            })
            .await;

        if let Err(err) = result {
            for (_, dst) in files {
                let _ = tokio::fs::remove_file(dst).await;
                let _ = tokio::fs::remove_file(sibling_temp_path(dst)).await;
            }
            return Err(ResolverError::not_found(err));
        }
        Ok(())
    }
}

fn sibling_temp_path(dst: &Path) -> PathBuf {
    let mut name = dst
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dst.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_temp_path_appends_suffix() {
        let dst = PathBuf::from("/tmp/scratch/keyring.tar.xz");
        let tmp = sibling_temp_path(&dst);
        assert_eq!(tmp, PathBuf::from("/tmp/scratch/keyring.tar.xz.part"));
    }

    #[tokio::test]
    async fn all_or_nothing_removes_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good_dst = dir.path().join("good");
        let bad_dst = dir.path().join("bad");

        let downloader = ReqwestDownloader::new(2, Some(Duration::from_millis(200))).unwrap();
        let files = vec![
            (Url::parse("http://127.0.0.1:1/unreachable-good").unwrap(), good_dst.clone()),
            (Url::parse("http://127.0.0.1:1/unreachable-bad").unwrap(), bad_dst.clone()),
        ];
        let result = downloader.get_files(&files).await;
        assert!(result.is_err());
        assert!(!good_dst.exists());
        assert!(!bad_dst.exists());
    }

    #[tokio::test]
    async fn fetches_and_renames_into_place() {
        let _m = mockito::mock("GET", "/index.json")
            .with_status(200)
            .with_body(b"{\"global\":{}}")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("index.json");
        let url = Url::parse(&format!("{}/index.json", mockito::server_url())).unwrap();

        let downloader = ReqwestDownloader::new(1, None).unwrap();
        downloader.get_files(&[(url, dst.clone())]).await.unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"{\"global\":{}}");
        assert!(!sibling_temp_path(&dst).exists());
    }

    #[tokio::test]
    async fn progress_callback_observes_bytes_read() {
        let _m = mockito::mock("GET", "/payload")
            .with_status(200)
            .with_body(vec![b'x'; 4096])
            .create();

        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("payload");
        let url = Url::parse(&format!("{}/payload", mockito::server_url())).unwrap();

        let seen = Arc::new(std::sync::Mutex::new(0u64));
        let seen_for_cb = seen.clone();
        let downloader = ReqwestDownloader::new(1, None)
            .unwrap()
            .with_progress(Arc::new(move |_url, _dst, bytes| {
                let mut seen = seen_for_cb.lock().unwrap();
                *seen = bytes;
            }));

        downloader.get_files(&[(url, dst)]).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), 4096);
    }
}
