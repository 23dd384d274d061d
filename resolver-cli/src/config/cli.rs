//! Command-line options for the resolver CLI.

use super::options;
use super::AppSettings;
use commons::MergeOptions;
use structopt::StructOpt;

/// CLI configuration flags, top-level.
#[derive(Debug, StructOpt)]
pub struct CliOptions {
    /// Verbosity level
    #[structopt(short = "v", parse(from_occurrences))]
    pub verbosity: u64,

    /// Path to configuration file
    #[structopt(short = "c", long = "config")]
    pub config_path: Option<String>,

    /// Print the final metrics snapshot to stdout before exiting
    #[structopt(long = "print-metrics")]
    pub print_metrics: bool,

    // Device and update source options
    #[structopt(flatten)]
    pub source: options::SourceOptions,

    // Filesystem layout options
    #[structopt(flatten)]
    pub paths: options::PathOptions,

    // Download tuning options
    #[structopt(flatten)]
    pub transfer: options::TransferOptions,
}

impl MergeOptions<CliOptions> for AppSettings {
    fn try_merge(&mut self, opts: CliOptions) -> anyhow::Result<()> {
        self.verbosity = match opts.verbosity {
            0 => self.verbosity,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        self.print_metrics = self.print_metrics || opts.print_metrics;

        self.try_merge(Some(opts.source))?;
        self.try_merge(Some(opts.paths))?;
        self.try_merge(Some(opts.transfer))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CliOptions;
    use crate::config::AppSettings;
    use structopt::StructOpt;

    #[test]
    fn cli_basic() {
        let no_args = vec!["argv0"];
        let no_args_cli = CliOptions::from_iter_safe(no_args).unwrap();
        assert_eq!(no_args_cli.verbosity, 0);

        let verbose_args = vec!["argv0", "-vvv"];
        let verbose_cli = CliOptions::from_iter_safe(verbose_args).unwrap();
        assert_eq!(verbose_cli.verbosity, 3);

        let device_args = vec!["argv0", "--source.device", "manta"];
        let device_cli = CliOptions::from_iter_safe(device_args).unwrap();
        assert_eq!(device_cli.source.device, Some("manta".to_string()));
    }

    #[test]
    fn cli_override_toml() {
        use crate::config::file::FileOptions;
        use commons::MergeOptions;

        let mut settings = AppSettings::default();
        assert_eq!(settings.verbosity, log::LevelFilter::Warn);

        let toml_verbosity = "verbosity=3";
        let file_opts: FileOptions = toml::from_str(toml_verbosity).unwrap();
        assert_eq!(file_opts.verbosity, Some(log::LevelFilter::Trace));

        settings.try_merge(Some(file_opts)).unwrap();
        assert_eq!(settings.verbosity, log::LevelFilter::Trace);

        let args = vec!["argv0", "-vv"];
        let cli_opts = CliOptions::from_iter_safe(args).unwrap();
        assert_eq!(cli_opts.verbosity, 2);

        settings.try_merge(cli_opts).unwrap();
        assert_eq!(settings.verbosity, log::LevelFilter::Debug);
    }
}
