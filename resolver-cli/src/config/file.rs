//! TOML file configuration options.

use super::options;
use super::AppSettings;
use anyhow::Context;
use commons::de::de_loglevel;
use commons::MergeOptions;
use std::io::Read;
use std::{fs, io, path};

/// TOML configuration, top-level.
#[derive(Debug, Deserialize)]
pub struct FileOptions {
    /// Verbosity level.
    #[serde(default = "Option::default", deserialize_with = "de_loglevel")]
    pub verbosity: Option<log::LevelFilter>,

    /// Device and update source options.
    pub source: Option<options::SourceOptions>,

    /// Filesystem layout options.
    pub paths: Option<options::PathOptions>,

    /// Download tuning options.
    pub transfer: Option<options::TransferOptions>,
}

impl FileOptions {
    /// Parse a TOML configuration from path.
    pub fn read_filepath<P>(cfg_path: P) -> anyhow::Result<Self>
    where
        P: AsRef<path::Path>,
    {
        let cfg_file = fs::File::open(&cfg_path).context(format!(
            "failed to open config path {:?}",
            cfg_path.as_ref()
        ))?;
        let mut bufrd = io::BufReader::new(cfg_file);

        let mut content = vec![];
        bufrd.read_to_end(&mut content)?;
        let cfg = toml::from_slice(&content).context(format!(
            "failed to parse config file {}",
            cfg_path.as_ref().display()
        ))?;

        Ok(cfg)
    }
}

impl MergeOptions<Option<FileOptions>> for AppSettings {
    fn try_merge(&mut self, opts: Option<FileOptions>) -> anyhow::Result<()> {
        if let Some(file) = opts {
            assign_if_some!(self.verbosity, file.verbosity);
            self.try_merge(file.source)?;
            self.try_merge(file.paths)?;
            self.try_merge(file.transfer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FileOptions;
    use crate::config::AppSettings;
    use commons::MergeOptions;

    #[test]
    fn toml_merge_settings() {
        let mut settings = AppSettings::default();
        assert_eq!(settings.concurrency, 4);

        let toml_input = "[transfer]\nconcurrency = 8";
        let file_opts: FileOptions = toml::from_str(toml_input).unwrap();

        settings.try_merge(Some(file_opts)).unwrap();
        assert_eq!(settings.concurrency, 8);
    }

    #[test]
    fn toml_sample_config() {
        use super::FileOptions;

        let opts = {
            use std::io::Write;

            let sample_config = r#"
                verbosity = 3

                [source]
                base-url = "https://system-image.example.com/"
                channel = "stable"
                device = "manta"
                build-number = 42

                [paths]
                gpg-dir = "/etc/system-image/keyrings"

                [transfer]
                concurrency = 2
            "#;

            let mut config_file = tempfile::NamedTempFile::new().unwrap();
            config_file
                .write_fmt(format_args!("{}", sample_config))
                .unwrap();
            FileOptions::read_filepath(config_file.path()).unwrap()
        };

        assert_eq!(opts.verbosity, Some(log::LevelFilter::Trace));
        assert!(opts.source.is_some());

        let src = opts.source.unwrap();
        assert_eq!(src.device, Some("manta".to_string()));
        assert_eq!(src.build_number, Some(42));
    }
}
