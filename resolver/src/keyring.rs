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

//! Fetching, verifying and pinning the five keyring slots.

use crate::download::Downloader;
use crate::errors::ResolverError;
use crate::gpg::SignatureVerifier;
use crate::model::{KeyringDescriptor, KeyringType};
use std::path::{Path, PathBuf};
use url::Url;

/// Owns the five pinned keyring slots on disk. `archive-master` is
/// pre-provisioned at construction time; the others are populated by
/// `install` as they are fetched and verified.
pub struct KeyringStore {
    gpg_dir: PathBuf,
}

impl KeyringStore {
    /// Open a keyring store rooted at `gpg_dir`, with `archive_master`
    /// already present at its pinned path (never downloaded).
    pub fn new(gpg_dir: impl Into<PathBuf>, archive_master: impl AsRef<Path>) -> crate::errors::Fallible<Self> {
        let gpg_dir = gpg_dir.into();
        std::fs::create_dir_all(&gpg_dir)?;
        let pinned = gpg_dir.join(format!("{}.gpg", KeyringType::ArchiveMaster));
        if !pinned.exists() {
            std::fs::copy(archive_master.as_ref(), &pinned)?;
        }
        Ok(KeyringStore { gpg_dir })
    }

    /// Pinned path for a keyring slot, whether or not it currently holds a
    /// key.
    pub fn path_for(&self, kind: KeyringType) -> PathBuf {
        self.gpg_dir.join(format!("{}.gpg", kind))
    }

    /// The pinned path for a keyring slot, if it has been populated.
    pub fn current(&self, kind: KeyringType) -> Option<PathBuf> {
        let path = self.path_for(kind);
        path.exists().then_some(path)
    }

    /// Atomically replace a slot with a freshly extracted key file.
    pub fn install(&self, kind: KeyringType, extracted_key: &Path) -> Result<(), ResolverError> {
        let dst = self.path_for(kind);
        let tmp = dst.with_extension("gpg.part");
        std::fs::copy(extracted_key, &tmp).map_err(ResolverError::keyring)?;
        std::fs::rename(&tmp, &dst).map_err(ResolverError::keyring)?;
        Ok(())
    }
}

/// Everything `fetch_keyring` needs to reach the network, verify and stage
/// a keyring, gathered so call sites don't thread six parameters through.
pub struct KeyringFetcher<'a> {
    /// Base URL every relative tarball/signature path is resolved against.
    pub base_url: &'a Url,
    /// Scratch directory; all intermediate downloads live here and are
    /// removed before `fetch_keyring` returns, on every exit path.
    pub scratch: &'a Path,
    /// Local device model, checked against an optional manifest pin.
    pub device_model: &'a str,
    /// Current UTC time, as epoch seconds; used for expiry checks.
    pub now: i64,
    pub downloader: &'a dyn Downloader,
    pub verifier: &'a dyn SignatureVerifier,
    pub store: &'a KeyringStore,
}

/// Installer-visible partition a verified keyring tarball is copied to.
pub enum Partition<'a> {
    /// `cache_partition`, for everything except the blacklist.
    Cache(&'a Path),
    /// `data_partition`, for the blacklist.
    Data(&'a Path),
}

impl<'a> Partition<'a> {
    fn path(&self) -> &Path {
        match self {
            Partition::Cache(p) | Partition::Data(p) => p,
        }
    }
}

impl<'a> KeyringFetcher<'a> {
    /// Download, verify, extract and pin a keyring tarball.
    ///
    /// Returns the local path to the extracted `keyring.gpg`. All scratch
    /// files used along the way are removed before returning, on both
    /// success and failure.
    pub async fn fetch_keyring(
        &self,
        expected_type: KeyringType,
        tarball_path: &str,
        signature_path: &str,
        signing_keyring: PathBuf,
        blacklist: Option<&Path>,
        partition: Partition<'_>,
    ) -> Result<PathBuf, ResolverError> {
        let tarball_url = self.base_url.join(tarball_path).map_err(ResolverError::not_found)?;
        let signature_url = self.base_url.join(signature_path).map_err(ResolverError::not_found)?;

        let tarball_dst = self.scratch.join("keyring.tar.xz");
        let signature_dst = self.scratch.join("keyring.tar.xz.asc");

        let result = self
            .fetch_and_install(
                expected_type,
                &tarball_url,
                &signature_url,
                &tarball_dst,
                &signature_dst,
                signing_keyring,
                blacklist,
                partition,
            )
            .await;

        let _ = std::fs::remove_file(&tarball_dst);
        let _ = std::fs::remove_file(&signature_dst);
        let _ = std::fs::remove_file(self.scratch.join("keyring.json"));
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_and_install(
        &self,
        expected_type: KeyringType,
        tarball_url: &Url,
        signature_url: &Url,
        tarball_dst: &Path,
        signature_dst: &Path,
        signing_keyring: PathBuf,
        blacklist: Option<&Path>,
        partition: Partition<'_>,
    ) -> Result<PathBuf, ResolverError> {
        self.downloader
            .get_files(&[
                (tarball_url.clone(), tarball_dst.to_path_buf()),
                (signature_url.clone(), signature_dst.to_path_buf()),
            ])
            .await?;

        self.verifier
            .verify(&[signing_keyring], blacklist, tarball_dst, signature_dst)?;

        let keyring_gpg = self.scratch.join("keyring.gpg");
        let keyring_json = self.scratch.join("keyring.json");
        extract_exactly_two(tarball_dst, self.scratch, &keyring_gpg, &keyring_json)?;

        let manifest: KeyringDescriptor = {
            let raw = std::fs::read_to_string(&keyring_json).map_err(ResolverError::keyring)?;
            serde_json::from_str(&raw).map_err(ResolverError::keyring)?
        };

        if manifest.keyring_type != expected_type {
            return Err(ResolverError::KeyringError(format!(
                "type mismatch: wanted {}, got {}",
                expected_type, manifest.keyring_type
            )));
        }
        if let Some(model) = &manifest.model {
            if model != self.device_model {
                return Err(ResolverError::KeyringError(format!(
                    "model mismatch: wanted {}, got {}",
                    self.device_model, model
                )));
            }
        }
        if manifest.is_expired(self.now) {
            return Err(ResolverError::KeyringError("expired".to_string()));
        }

        std::fs::create_dir_all(partition.path()).map_err(ResolverError::keyring)?;
        let tarball_name = tarball_path_basename(tarball_url);
        let signature_name = tarball_path_basename(signature_url);
        std::fs::copy(tarball_dst, partition.path().join(&tarball_name)).map_err(ResolverError::keyring)?;
        std::fs::copy(signature_dst, partition.path().join(&signature_name)).map_err(ResolverError::keyring)?;

        Ok(keyring_gpg)
    }
}

fn tarball_path_basename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("keyring.tar.xz")
        .to_string()
}

/// Extract a `.tar.xz` that must contain exactly `keyring.gpg` and
/// `keyring.json`, failing otherwise.
fn extract_exactly_two(
    tarball: &Path,
    dst_dir: &Path,
    keyring_gpg: &Path,
    keyring_json: &Path,
) -> Result<(), ResolverError> {
    let file = std::fs::File::open(tarball).map_err(ResolverError::keyring)?;
    let decoder = xz2::read::XzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    let mut seen = Vec::new();
    for entry in archive.entries().map_err(ResolverError::keyring)? {
        let mut entry = entry.map_err(ResolverError::keyring)?;
        let path = entry.path().map_err(ResolverError::keyring)?.to_path_buf();
        seen.push(path.clone());
        entry.unpack_in(dst_dir).map_err(ResolverError::keyring)?;
    }

    if seen.len() != 2 || !keyring_gpg.exists() || !keyring_json.exists() {
        return Err(ResolverError::KeyringError(format!(
            "expected exactly keyring.gpg and keyring.json, found {:?}",
            seen
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeDownloader {
        files: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn get_files(&self, files: &[(Url, PathBuf)]) -> Result<(), ResolverError> {
            for (url, dst) in files {
                let bytes = self
                    .files
                    .get(url.path())
                    .ok_or_else(|| ResolverError::not_found(format!("no such file: {}", url.path())))?;
                std::fs::write(dst, bytes).map_err(ResolverError::not_found)?;
            }
            Ok(())
        }
    }

    struct AlwaysOkVerifier;
    impl crate::gpg::SignatureVerifier for AlwaysOkVerifier {
        fn verify(&self, _: &[PathBuf], _: Option<&Path>, _: &Path, _: &Path) -> Result<(), ResolverError> {
            Ok(())
        }
    }

    fn append_entry<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }

    fn tarball_with_manifest(manifest: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(xz2::write::XzEncoder::new(Vec::new(), 6));
        append_entry(&mut builder, "keyring.gpg", b"fake-public-key-material");
        append_entry(&mut builder, "keyring.json", manifest.as_bytes());
        builder.into_inner().unwrap().finish().unwrap()
    }

    struct Fixture {
        scratch: tempfile::TempDir,
        cache: tempfile::TempDir,
        base_url: Url,
        downloader: FakeDownloader,
        verifier: AlwaysOkVerifier,
        store: KeyringStore,
        _gpg: tempfile::TempDir,
        _archive_master: tempfile::NamedTempFile,
    }

    impl Fixture {
        fn new(manifest: &str) -> Self {
            let scratch = tempfile::tempdir().unwrap();
            let cache = tempfile::tempdir().unwrap();
            let gpg = tempfile::tempdir().unwrap();
            let archive_master = tempfile::NamedTempFile::new().unwrap();
            std::fs::write(archive_master.path(), b"fake-archive-master-key").unwrap();
            let store = KeyringStore::new(gpg.path(), archive_master.path()).unwrap();

            let mut files = HashMap::new();
            files.insert("/gpg/image-master.tar.xz".to_string(), tarball_with_manifest(manifest));
            files.insert("/gpg/image-master.tar.xz.asc".to_string(), b"sig".to_vec());

            Fixture {
                scratch,
                cache,
                base_url: Url::parse("https://example.com/").unwrap(),
                downloader: FakeDownloader { files },
                verifier: AlwaysOkVerifier,
                store,
                _gpg: gpg,
                _archive_master: archive_master,
            }
        }

        fn fetcher(&self) -> KeyringFetcher<'_> {
            KeyringFetcher {
                base_url: &self.base_url,
                scratch: self.scratch.path(),
                device_model: "manta",
                now: 1_000_000,
                downloader: &self.downloader,
                verifier: &self.verifier,
                store: &self.store,
            }
        }
    }

    #[tokio::test]
    async fn type_mismatch_is_a_keyring_error() {
        let fixture = Fixture::new(r#"{"type":"archive-master"}"#);
        let result = fixture
            .fetcher()
            .fetch_keyring(
                crate::model::KeyringType::ImageMaster,
                "gpg/image-master.tar.xz",
                "gpg/image-master.tar.xz.asc",
                fixture.store.path_for(crate::model::KeyringType::ArchiveMaster),
                None,
                Partition::Cache(fixture.cache.path()),
            )
            .await;
        assert!(matches!(result, Err(ResolverError::KeyringError(_))));
    }

    #[tokio::test]
    async fn model_mismatch_is_a_keyring_error() {
        let fixture = Fixture::new(r#"{"type":"image-master","model":"grouper"}"#);
        let result = fixture
            .fetcher()
            .fetch_keyring(
                crate::model::KeyringType::ImageMaster,
                "gpg/image-master.tar.xz",
                "gpg/image-master.tar.xz.asc",
                fixture.store.path_for(crate::model::KeyringType::ArchiveMaster),
                None,
                Partition::Cache(fixture.cache.path()),
            )
            .await;
        assert!(matches!(result, Err(ResolverError::KeyringError(_))));
    }

    #[tokio::test]
    async fn expired_keyring_is_a_keyring_error() {
        let fixture = Fixture::new(r#"{"type":"image-master","expiry":999999}"#);
        let result = fixture
            .fetcher()
            .fetch_keyring(
                crate::model::KeyringType::ImageMaster,
                "gpg/image-master.tar.xz",
                "gpg/image-master.tar.xz.asc",
                fixture.store.path_for(crate::model::KeyringType::ArchiveMaster),
                None,
                Partition::Cache(fixture.cache.path()),
            )
            .await;
        assert!(matches!(result, Err(ResolverError::KeyringError(_))));
    }

    #[tokio::test]
    async fn valid_manifest_installs_and_copies_to_partition() {
        let fixture = Fixture::new(r#"{"type":"image-master"}"#);
        let result = fixture
            .fetcher()
            .fetch_keyring(
                crate::model::KeyringType::ImageMaster,
                "gpg/image-master.tar.xz",
                "gpg/image-master.tar.xz.asc",
                fixture.store.path_for(crate::model::KeyringType::ArchiveMaster),
                None,
                Partition::Cache(fixture.cache.path()),
            )
            .await;
        let extracted = result.unwrap();
        assert!(extracted.exists());
        assert!(fixture.cache.path().join("image-master.tar.xz").exists());
        assert!(fixture.cache.path().join("image-master.tar.xz.asc").exists());
    }
}
