//! Application settings for the resolver CLI.

use super::{cli, file};
use custom_debug_derive::Debug as CustomDebug;
use std::path::PathBuf;
use structopt::StructOpt;
use url::Url;

/// Default base URL, overridden by every real deployment.
pub static DEFAULT_BASE_URL: &str = "http://localhost/";

/// Runtime application settings (validated config).
#[derive(CustomDebug, SmartDefault)]
pub struct AppSettings {
    /// Global log level.
    #[default(log::LevelFilter::Warn)]
    pub verbosity: log::LevelFilter,

    /// Print the final metrics snapshot to stdout before exiting.
    pub print_metrics: bool,

    /// Base URL of the update server.
    #[default(Url::parse(DEFAULT_BASE_URL).unwrap())]
    pub base_url: Url,

    /// Device channel.
    #[default(String::from("stable"))]
    pub channel: String,

    /// Device model.
    pub device: String,

    /// Content kind this run resolves upgrades for.
    #[default(String::from("ubuntu"))]
    pub content_kind: String,

    /// Current build number, if given directly.
    pub build_number: Option<u64>,

    /// File to read the current build number from, if not given directly.
    pub build_number_file: Option<PathBuf>,

    /// Directory holding installed GPG keyrings.
    #[default(PathBuf::from("/etc/system-image/keyrings"))]
    pub gpg_dir: PathBuf,

    /// Pre-provisioned archive-master keyring.
    #[default(PathBuf::from("/etc/system-image/archive-master.gpg"))]
    pub archive_master: PathBuf,

    /// Scratch directory for in-progress downloads.
    pub scratch_dir: Option<PathBuf>,

    /// Installer-visible partition for non-blacklist keyrings.
    #[default(PathBuf::from("/var/lib/system-image/cache"))]
    pub cache_partition: PathBuf,

    /// Installer-visible partition for the blacklist keyring.
    #[default(PathBuf::from("/var/lib/system-image/data"))]
    pub data_partition: PathBuf,

    /// Maximum number of files downloaded concurrently.
    #[default(4)]
    pub concurrency: usize,

    /// Per-request timeout, in seconds.
    #[default(30)]
    pub timeout_secs: u64,
}

impl AppSettings {
    /// Lookup all optional configs, merge them with defaults, and
    /// transform into valid runtime settings.
    pub fn assemble() -> anyhow::Result<Self> {
        use commons::MergeOptions;

        let defaults = Self::default();

        // Source options.
        let cli_opts = cli::CliOptions::from_args();
        let file_opts = match &cli_opts.config_path {
            Some(ref path) => Some(file::FileOptions::read_filepath(path)?),
            None => None,
        };

        // Combine options into a single config.
        let mut cfg = defaults;
        cfg.try_merge(cli_opts)?;
        cfg.try_merge(file_opts)?;

        // Validate and convert to settings.
        Self::try_validate(cfg)
    }

    /// Validate and build runtime settings.
    fn try_validate(self) -> anyhow::Result<Self> {
        if self.device.is_empty() {
            anyhow::bail!("no device model configured (source.device)");
        }
        if self.build_number.is_none() && self.build_number_file.is_none() {
            anyhow::bail!(
                "no current build number configured (source.build-number or source.build-number-file)"
            );
        }
        if self.concurrency == 0 {
            anyhow::bail!("transfer.concurrency must be at least 1");
        }

        Ok(self)
    }
}
