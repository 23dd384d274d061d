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

#[macro_use]
extern crate commons;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate smart_default;
#[macro_use]
extern crate structopt;

mod config;

use anyhow::Context;
use commons::metrics::{self, encode_to_string};
use resolver::download::ReqwestDownloader;
use resolver::gpg::RpgpVerifier;
use resolver::keyring::KeyringStore;
use resolver::metrics::ResolverMetrics;
use resolver::{ResolverContext, State};
use std::fs;
use std::time::Duration;

/// Common prefix for resolver metrics.
pub static METRICS_PREFIX: &str = "resolver";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = config::AppSettings::assemble()?;
    env_logger::Builder::from_default_env()
        .filter(Some(module_path!()), settings.verbosity)
        .filter(Some("resolver"), settings.verbosity)
        .init();
    info!("application settings:\n{:#?}", &settings);

    let registry = metrics::new_registry(Some(METRICS_PREFIX.to_string()))?;
    commons::register_metrics(&registry, "resolver", env!("CARGO_PKG_VERSION"))?;
    let resolver_metrics = ResolverMetrics::register(&registry).context("registering resolver metrics")?;

    let build_number = current_build_number(&settings)?;
    let scratch = match &settings.scratch_dir {
        Some(dir) => {
            fs::create_dir_all(dir).context("creating scratch directory")?;
            tempfile::TempDir::new_in(dir)
        }
        None => tempfile::TempDir::new(),
    }
    .context("creating scratch directory")?;

    let store = KeyringStore::new(settings.gpg_dir.clone(), &settings.archive_master)
        .context("provisioning keyring store")?;
    let downloader = ReqwestDownloader::new(
        settings.concurrency,
        Some(Duration::from_secs(settings.timeout_secs)),
    )
    .context("building downloader")?;
    let verifier = RpgpVerifier::new();

    let ctx = ResolverContext {
        base_url: settings.base_url.clone(),
        channel: settings.channel.clone(),
        device: settings.device.clone(),
        build_number,
        content_kind: settings.content_kind.clone(),
        scratch: scratch.path().to_path_buf(),
        cache_partition: settings.cache_partition.clone(),
        data_partition: settings.data_partition.clone(),
        store,
        downloader: &downloader,
        verifier: &verifier,
        metrics: Some(&resolver_metrics),
    };

    let mut state = State::new(ctx);
    let run_result = state.run().await;

    if settings.print_metrics {
        println!("{}", encode_to_string(&registry)?);
    } else {
        debug!("{}", encode_to_string(&registry)?);
    }

    run_result.context("resolver run failed")?;

    match &state.winner {
        Some(path) if !path.is_empty() => {
            info!(
                "resolved update to build {}: {} bytes, {} extra reboot(s)",
                path.destination_version().unwrap_or(build_number),
                path.total_bytes(),
                path.extra_reboots()
            );
        }
        _ => info!("device is already on the newest available build"),
    }

    Ok(())
}

/// Determine the device's current build number, either from the explicit
/// setting or by reading it out of the configured build number file.
fn current_build_number(settings: &config::AppSettings) -> anyhow::Result<u64> {
    if let Some(build_number) = settings.build_number {
        return Ok(build_number);
    }

    let path = settings
        .build_number_file
        .as_ref()
        .expect("validated by AppSettings::try_validate");
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading build number file {}", path.display()))?;
    content
        .trim()
        .parse()
        .with_context(|| format!("parsing build number from {}", path.display()))
}
