//! Options shared by CLI and TOML.

use super::AppSettings;
use commons::MergeOptions;
use std::path::PathBuf;
use structopt::StructOpt;
use url::Url;

/// Options identifying the device and the update it should resolve against.
#[derive(Debug, Deserialize, Serialize, StructOpt)]
#[serde(rename_all = "kebab-case")]
pub struct SourceOptions {
    /// Base URL of the update server (e.g. "https://system-image.example.com/")
    #[structopt(name = "source_base_url", long = "source.base-url")]
    pub base_url: Option<Url>,

    /// Device channel (e.g. "stable")
    #[structopt(name = "source_channel", long = "source.channel")]
    pub channel: Option<String>,

    /// Device model (e.g. "manta")
    #[structopt(name = "source_device", long = "source.device")]
    pub device: Option<String>,

    /// Content kind to resolve upgrades for (e.g. "ubuntu")
    #[structopt(name = "source_content_kind", long = "source.content-kind")]
    pub content_kind: Option<String>,

    /// Current build number. Overrides `source.build-number-file` when set.
    #[structopt(name = "source_build_number", long = "source.build-number")]
    pub build_number: Option<u64>,

    /// File containing the current build number as plain text
    #[structopt(
        name = "source_build_number_file",
        long = "source.build-number-file"
    )]
    pub build_number_file: Option<PathBuf>,
}

impl MergeOptions<Option<SourceOptions>> for AppSettings {
    fn try_merge(&mut self, opts: Option<SourceOptions>) -> anyhow::Result<()> {
        if let Some(source) = opts {
            assign_if_some!(self.base_url, source.base_url);
            assign_if_some!(self.channel, source.channel);
            assign_if_some!(self.device, source.device);
            assign_if_some!(self.content_kind, source.content_kind);
            if source.build_number.is_some() {
                self.build_number = source.build_number;
            }
            if source.build_number_file.is_some() {
                self.build_number_file = source.build_number_file;
            }
        }
        Ok(())
    }
}

/// Options for the filesystem layout the resolver reads from and writes to.
#[derive(Debug, Deserialize, Serialize, StructOpt)]
#[serde(rename_all = "kebab-case")]
pub struct PathOptions {
    /// Directory holding installed GPG keyrings
    #[structopt(name = "paths_gpg_dir", long = "paths.gpg-dir")]
    pub gpg_dir: Option<PathBuf>,

    /// Pre-provisioned archive-master keyring, copied into `paths.gpg-dir` on first run
    #[structopt(name = "paths_archive_master", long = "paths.archive-master")]
    pub archive_master: Option<PathBuf>,

    /// Scratch directory for in-progress downloads. Defaults to a fresh temporary directory.
    #[structopt(name = "paths_scratch_dir", long = "paths.scratch-dir")]
    pub scratch_dir: Option<PathBuf>,

    /// Installer-visible partition for non-blacklist keyrings
    #[structopt(name = "paths_cache_partition", long = "paths.cache-partition")]
    pub cache_partition: Option<PathBuf>,

    /// Installer-visible partition for the blacklist keyring
    #[structopt(name = "paths_data_partition", long = "paths.data-partition")]
    pub data_partition: Option<PathBuf>,
}

impl MergeOptions<Option<PathOptions>> for AppSettings {
    fn try_merge(&mut self, opts: Option<PathOptions>) -> anyhow::Result<()> {
        if let Some(paths) = opts {
            assign_if_some!(self.gpg_dir, paths.gpg_dir);
            assign_if_some!(self.archive_master, paths.archive_master);
            if paths.scratch_dir.is_some() {
                self.scratch_dir = paths.scratch_dir;
            }
            assign_if_some!(self.cache_partition, paths.cache_partition);
            assign_if_some!(self.data_partition, paths.data_partition);
        }
        Ok(())
    }
}

/// Options tuning how files are downloaded.
#[derive(Debug, Deserialize, Serialize, StructOpt)]
#[serde(rename_all = "kebab-case")]
pub struct TransferOptions {
    /// Maximum number of files downloaded concurrently
    #[structopt(name = "transfer_concurrency", long = "transfer.concurrency")]
    pub concurrency: Option<usize>,

    /// Per-request timeout, in seconds
    #[structopt(name = "transfer_timeout", long = "transfer.timeout-secs")]
    pub timeout_secs: Option<u64>,
}

impl MergeOptions<Option<TransferOptions>> for AppSettings {
    fn try_merge(&mut self, opts: Option<TransferOptions>) -> anyhow::Result<()> {
        if let Some(transfer) = opts {
            assign_if_some!(self.concurrency, transfer.concurrency);
            assign_if_some!(self.timeout_secs, transfer.timeout_secs);
        }
        Ok(())
    }
}
