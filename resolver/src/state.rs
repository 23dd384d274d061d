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

//! The FIFO step queue orchestrating keyring trust, channel lookup, index
//! verification and candidate selection into a single run.

use crate::candidates;
use crate::context::ResolverContext;
use crate::download::Downloader;
use crate::errors::ResolverError;
use crate::gpg::SignatureVerifier;
use crate::keyring::{KeyringFetcher, Partition};
use crate::model::{ChannelsDescriptor, DeviceKeyringRef, Index, KeyringType, UpgradePath};
use crate::scores;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::PathBuf;

/// A pending unit of work. Steps may enqueue follow-up steps (including a
/// retry of their originating step, preceded by a key-recovery step).
enum Step {
    GetBlacklist,
    GetChannel,
    GetDeviceKeyring(DeviceKeyringRef),
    GetIndex(String),
    CalculateWinner,
    DownloadFiles,
    GetMasterKey(Box<Step>),
    GetSigningKey(Box<Step>),
}

impl Step {
    /// Stable name used as the `step` label on `resolver_step_total`.
    fn name(&self) -> &'static str {
        match self {
            Step::GetBlacklist => "get_blacklist",
            Step::GetChannel => "get_channel",
            Step::GetDeviceKeyring(_) => "get_device_keyring",
            Step::GetIndex(_) => "get_index",
            Step::CalculateWinner => "calculate_winner",
            Step::DownloadFiles => "download_files",
            Step::GetMasterKey(_) => "get_master_key",
            Step::GetSigningKey(_) => "get_signing_key",
        }
    }
}

/// One run of the update resolver. Drive it with `run()`, or step it by
/// hand via `step()` for testing.
pub struct State<'a> {
    ctx: ResolverContext<'a>,
    queue: VecDeque<Step>,

    /// Learned artifacts, exposed for debugging and testing.
    pub blacklist: Option<PathBuf>,
    pub channels: Option<ChannelsDescriptor>,
    pub index: Option<Index>,
    pub device_keyring: Option<PathBuf>,
    pub candidates: Option<Vec<UpgradePath>>,
    pub winner: Option<UpgradePath>,

    // A recovery step may fire at most once per originating step per run;
    // a second failure of the same shape is fatal (see the state machine
    // invariant).
    blacklist_recovered: bool,
    channel_recovered: bool,
}

impl<'a> State<'a> {
    /// Construct a fresh run. The queue starts with a single pending step:
    /// `get_blacklist`.
    pub fn new(ctx: ResolverContext<'a>) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(Step::GetBlacklist);
        State {
            ctx,
            queue,
            blacklist: None,
            channels: None,
            index: None,
            device_keyring: None,
            candidates: None,
            winner: None,
            blacklist_recovered: false,
            channel_recovered: false,
        }
    }

    /// Drive the machine to completion: either the queue empties (a
    /// successful run, possibly with nothing to do) or a step raises a
    /// non-recoverable error.
    pub async fn run(&mut self) -> Result<(), ResolverError> {
        let result = self.run_inner().await;
        match &result {
            Ok(()) => info!("resolver run completed"),
            Err(err) => warn!("resolver run failed: {}", err),
        }
        if let Some(metrics) = self.ctx.metrics {
            metrics.record_result(if result.is_ok() { "ok" } else { "error" });
        }
        result
    }

    async fn run_inner(&mut self) -> Result<(), ResolverError> {
        while let Some(step) = self.queue.pop_front() {
            self.dispatch(step).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, step: Step) -> Result<(), ResolverError> {
        debug!("dispatching step: {}", step.name());
        if let Some(metrics) = self.ctx.metrics {
            metrics.record_step(step.name());
        }
        match step {
            Step::GetBlacklist => self.get_blacklist().await,
            Step::GetChannel => self.get_channel().await,
            Step::GetDeviceKeyring(keyring_ref) => self.get_device_keyring(keyring_ref).await,
            Step::GetIndex(index_path) => self.get_index(index_path).await,
            Step::CalculateWinner => self.calculate_winner(),
            Step::DownloadFiles => self.download_files().await,
            Step::GetMasterKey(next) => self.get_master_key(*next).await,
            Step::GetSigningKey(next) => self.get_signing_key(*next).await,
        }
    }

    fn fetcher(&self) -> KeyringFetcher<'_> {
        KeyringFetcher {
            base_url: &self.ctx.base_url,
            scratch: &self.ctx.scratch,
            device_model: &self.ctx.device,
            now: self.ctx.now(),
            downloader: self.ctx.downloader,
            verifier: self.ctx.verifier,
            store: &self.ctx.store,
        }
    }

    async fn get_blacklist(&mut self) -> Result<(), ResolverError> {
        let fetcher = self.fetcher();
        let outcome = fetcher
            .fetch_keyring(
                KeyringType::Blacklist,
                "gpg/blacklist.tar.xz",
                "gpg/blacklist.tar.xz.asc",
                self.ctx.store.path_for(KeyringType::ImageMaster),
                self.blacklist.as_deref(),
                Partition::Data(&self.ctx.data_partition),
            )
            .await;

        match outcome {
            Ok(extracted) => {
                self.ctx.store.install(KeyringType::Blacklist, &extracted)?;
                self.blacklist = Some(self.ctx.store.path_for(KeyringType::Blacklist));
                self.queue.push_back(Step::GetChannel);
                Ok(())
            }
            Err(ResolverError::NotFound(_)) => {
                self.blacklist = None;
                self.queue.push_back(Step::GetChannel);
                Ok(())
            }
            Err(ResolverError::SignatureError(detail)) => {
                if self.blacklist_recovered {
                    warn!("blacklist signature still invalid after image-master recovery: {}", detail);
                    return Err(ResolverError::SignatureError(format!(
                        "blacklist signature still invalid after image-master recovery: {}",
                        detail
                    )));
                }
                warn!("blacklist signature invalid ({}), retrying after image-master recovery", detail);
                self.blacklist_recovered = true;
                self.queue.push_front(Step::GetMasterKey(Box::new(Step::GetBlacklist)));
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    async fn get_channel(&mut self) -> Result<(), ResolverError> {
        let channels_url = self.ctx.url("channels.json").map_err(ResolverError::not_found)?;
        let asc_url = self.ctx.url("channels.json.asc").map_err(ResolverError::not_found)?;
        let channels_path = self.ctx.scratch.join("channels.json");
        let asc_path = self.ctx.scratch.join("channels.json.asc");

        self.ctx
            .downloader
            .get_files(&[(channels_url, channels_path.clone()), (asc_url, asc_path.clone())])
            .await?;

        let mut keyrings = vec![self.ctx.store.path_for(KeyringType::ImageSigning)];
        if let Some(device_keyring) = &self.device_keyring {
            keyrings.push(device_keyring.clone());
        }
        let verify_result = self
            .ctx
            .verifier
            .verify(&keyrings, self.blacklist.as_deref(), &channels_path, &asc_path);

        let parsed = verify_result.and_then(|()| {
            let raw = std::fs::read_to_string(&channels_path).map_err(ResolverError::not_found)?;
            serde_json::from_str::<ChannelsDescriptor>(&raw).map_err(ResolverError::not_found)
        });

        let _ = std::fs::remove_file(&channels_path);
        let _ = std::fs::remove_file(&asc_path);

        match parsed {
            Ok(channels) => {
                let device_entry = channels
                    .get(&self.ctx.channel)
                    .and_then(|devices| devices.get(&self.ctx.device))
                    .cloned();
                self.channels = Some(channels);
                let device_entry = match device_entry {
                    // Neither channel nor device is described: nothing
                    // more to do, and the queue is already empty.
                    None => return Ok(()),
                    Some(entry) => entry,
                };
                if let Some(keyring_ref) = device_entry.keyring.clone() {
                    self.queue.push_back(Step::GetDeviceKeyring(keyring_ref));
                }
                self.queue.push_back(Step::GetIndex(device_entry.index.clone()));
                Ok(())
            }
            Err(ResolverError::SignatureError(detail)) => {
                if self.channel_recovered {
                    warn!("channels.json signature still invalid after image-signing recovery: {}", detail);
                    return Err(ResolverError::SignatureError(format!(
                        "channels.json signature still invalid after image-signing recovery: {}",
                        detail
                    )));
                }
                warn!("channels.json signature invalid ({}), retrying after image-signing recovery", detail);
                self.channel_recovered = true;
                self.queue.push_front(Step::GetSigningKey(Box::new(Step::GetChannel)));
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    async fn get_device_keyring(&mut self, keyring_ref: DeviceKeyringRef) -> Result<(), ResolverError> {
        let fetcher = self.fetcher();
        let extracted = fetcher
            .fetch_keyring(
                KeyringType::DeviceSigning,
                &keyring_ref.path,
                &keyring_ref.signature,
                self.ctx.store.path_for(KeyringType::ImageSigning),
                self.blacklist.as_deref(),
                Partition::Cache(&self.ctx.cache_partition),
            )
            .await?;
        self.ctx.store.install(KeyringType::DeviceSigning, &extracted)?;
        self.device_keyring = Some(self.ctx.store.path_for(KeyringType::DeviceSigning));
        Ok(())
    }

    async fn get_index(&mut self, index_path: String) -> Result<(), ResolverError> {
        let index_url = self.ctx.url(&index_path).map_err(ResolverError::not_found)?;
        let asc_url = self
            .ctx
            .url(&format!("{}.asc", index_path))
            .map_err(ResolverError::not_found)?;
        let index_dst = self.ctx.scratch.join("index.json");
        let asc_dst = self.ctx.scratch.join("index.json.asc");

        self.ctx
            .downloader
            .get_files(&[(index_url, index_dst.clone()), (asc_url, asc_dst.clone())])
            .await?;

        let mut keyrings = vec![self.ctx.store.path_for(KeyringType::ImageSigning)];
        if let Some(device_keyring) = &self.device_keyring {
            keyrings.push(device_keyring.clone());
        }
        let verify_result = self
            .ctx
            .verifier
            .verify(&keyrings, self.blacklist.as_deref(), &index_dst, &asc_dst);

        let parsed = verify_result.and_then(|()| {
            let raw = std::fs::read_to_string(&index_dst).map_err(ResolverError::not_found)?;
            serde_json::from_str::<Index>(&raw).map_err(ResolverError::not_found)
        });

        let _ = std::fs::remove_file(&index_dst);
        let _ = std::fs::remove_file(&asc_dst);

        // Unlike get_blacklist/get_channel, a signature failure here has no
        // recovery edge: it propagates straight out of run().
        self.index = Some(parsed?);
        self.queue.push_back(Step::CalculateWinner);
        Ok(())
    }

    fn calculate_winner(&mut self) -> Result<(), ResolverError> {
        let index = self
            .index
            .as_ref()
            .expect("index verified before calculate_winner runs");
        let candidates = candidates::candidates(index, self.ctx.build_number, &self.ctx.content_kind)?;
        info!("generated {} candidate upgrade path(s)", candidates.len());
        let winner = scores::choose(&candidates);
        debug!("chosen path destination version: {:?}", winner.destination_version());
        self.candidates = Some(candidates);
        self.winner = Some(winner);
        self.queue.push_back(Step::DownloadFiles);
        Ok(())
    }

    async fn download_files(&mut self) -> Result<(), ResolverError> {
        let winner = self
            .winner
            .as_ref()
            .expect("winner chosen before download_files runs");

        let mut downloads = Vec::new();
        let mut local_files = Vec::new();
        for image in &winner.images {
            for file in &image.files {
                let dst = self.ctx.scratch.join(local_name(&file.path));
                let asc_dst = self.ctx.scratch.join(local_name(&file.signature));
                downloads.push((self.ctx.url(&file.path).map_err(ResolverError::not_found)?, dst.clone()));
                downloads.push((
                    self.ctx.url(&file.signature).map_err(ResolverError::not_found)?,
                    asc_dst.clone(),
                ));
                local_files.push((dst, asc_dst));
            }
        }

        self.ctx.downloader.get_files(&downloads).await?;
        if let Some(metrics) = self.ctx.metrics {
            metrics.record_download_bytes(winner.total_bytes());
        }

        let mut keyrings = vec![self.ctx.store.path_for(KeyringType::ImageSigning)];
        if let Some(device_keyring) = &self.device_keyring {
            keyrings.push(device_keyring.clone());
        }

        for (path, asc_path) in &local_files {
            if let Err(err) = self
                .ctx
                .verifier
                .verify(&keyrings, self.blacklist.as_deref(), path, asc_path)
            {
                for (path, asc_path) in &local_files {
                    let _ = std::fs::remove_file(path);
                    let _ = std::fs::remove_file(asc_path);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    async fn get_master_key(&mut self, next: Step) -> Result<(), ResolverError> {
        let fetcher = self.fetcher();
        let outcome = fetcher
            .fetch_keyring(
                KeyringType::ImageMaster,
                "gpg/image-master.tar.xz",
                "gpg/image-master.tar.xz.asc",
                self.ctx.store.path_for(KeyringType::ArchiveMaster),
                self.blacklist.as_deref(),
                Partition::Cache(&self.ctx.cache_partition),
            )
            .await;

        let extracted = outcome.map_err(|err| {
            // Never chain the original cause: a failure to recover is
            // always reported as a fresh signature error.
            warn!("image-master recovery failed: {}", err);
            ResolverError::SignatureError("no valid image-master key found".to_string())
        })?;
        self.ctx.store.install(KeyringType::ImageMaster, &extracted)?;
        info!("installed recovered image-master key, retrying originating step");
        self.queue.push_back(next);
        Ok(())
    }

    async fn get_signing_key(&mut self, next: Step) -> Result<(), ResolverError> {
        let fetcher = self.fetcher();
        let outcome = fetcher
            .fetch_keyring(
                KeyringType::ImageSigning,
                "gpg/image-signing.tar.xz",
                "gpg/image-signing.tar.xz.asc",
                self.ctx.store.path_for(KeyringType::ImageMaster),
                self.blacklist.as_deref(),
                Partition::Cache(&self.ctx.cache_partition),
            )
            .await;

        let extracted = outcome.map_err(|err| {
            warn!("image-signing recovery failed: {}", err);
            ResolverError::SignatureError("no valid image-signing key found".to_string())
        })?;
        self.ctx.store.install(KeyringType::ImageSigning, &extracted)?;
        info!("installed recovered image-signing key, retrying originating step");
        self.queue.push_back(next);
        Ok(())
    }
}

fn local_name(url_path: &str) -> String {
    url_path.rsplit('/').next().unwrap_or(url_path).to_string()
}
