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

//! Prometheus counters the state machine updates as it dispatches steps,
//! downloads files and reaches a terminal outcome.

use crate::errors::Fallible;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Counters registered once per process and updated throughout a run.
pub struct ResolverMetrics {
    /// `resolver_step_total{step=...}`: one increment per dispatched step.
    pub step_total: IntCounterVec,
    /// `resolver_download_bytes_total`: bytes fetched by the winning path's
    /// artifact download, accumulated across runs.
    pub download_bytes_total: IntCounter,
    /// `resolver_run_result_total{result=...}`: terminal outcome of a run,
    /// one of `ok` or `error`.
    pub run_result_total: IntCounterVec,
}

impl ResolverMetrics {
    /// Register the resolver's counters into `registry`.
    pub fn register(registry: &Registry) -> Fallible<Self> {
        let step_total = IntCounterVec::new(
            Opts::new(
                "resolver_step_total",
                "Count of state machine steps dispatched, by step name",
            ),
            &["step"],
        )?;
        registry.register(Box::new(step_total.clone()))?;

        let download_bytes_total = IntCounter::new(
            "resolver_download_bytes_total",
            "Total bytes fetched for the winning upgrade path",
        )?;
        registry.register(Box::new(download_bytes_total.clone()))?;

        let run_result_total = IntCounterVec::new(
            Opts::new(
                "resolver_run_result_total",
                "Count of terminal run outcomes, by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(run_result_total.clone()))?;

        Ok(ResolverMetrics {
            step_total,
            download_bytes_total,
            run_result_total,
        })
    }

    /// Record that `step` was dispatched.
    pub fn record_step(&self, step: &str) {
        self.step_total.with_label_values(&[step]).inc();
    }

    /// Record `bytes` fetched for the winning path.
    pub fn record_download_bytes(&self, bytes: u64) {
        self.download_bytes_total.inc_by(bytes);
    }

    /// Record a terminal run outcome (`"ok"` or `"error"`).
    pub fn record_result(&self, result: &str) {
        self.run_result_total.with_label_values(&[result]).inc();
    }
}
