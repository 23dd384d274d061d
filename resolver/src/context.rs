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

//! Everything a state machine run needs, threaded explicitly rather than
//! read from process-global configuration.

use crate::download::Downloader;
use crate::gpg::SignatureVerifier;
use crate::keyring::KeyringStore;
use crate::metrics::ResolverMetrics;
use std::path::PathBuf;
use url::Url;

/// Per-run configuration and collaborators for the state machine.
pub struct ResolverContext<'a> {
    /// Base URL every relative path in the protocol is resolved against.
    pub base_url: Url,
    /// Device channel (e.g. "stable").
    pub channel: String,
    /// Device model (e.g. "manta").
    pub device: String,
    /// Current build number, read from the local build file.
    pub build_number: u64,
    /// Content kind this run resolves upgrades for (e.g. "ubuntu"). The
    /// wire protocol supports multiple content kinds per index; a single
    /// run targets exactly one.
    pub content_kind: String,
    /// Scratch directory owned exclusively by this run.
    pub scratch: PathBuf,
    /// Installer-visible partition for non-blacklist keyrings.
    pub cache_partition: PathBuf,
    /// Installer-visible partition for the blacklist keyring.
    pub data_partition: PathBuf,
    pub store: KeyringStore,
    pub downloader: &'a dyn Downloader,
    pub verifier: &'a dyn SignatureVerifier,
    /// Optional step/download/outcome counters. `None` in tests that don't
    /// care about metrics.
    pub metrics: Option<&'a ResolverMetrics>,
}

impl<'a> ResolverContext<'a> {
    /// Resolve a protocol-relative path against `base_url`.
    pub fn url(&self, path: &str) -> crate::errors::Fallible<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Current UTC time as epoch seconds, used for keyring expiry checks.
    pub fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}
