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

//! The three error kinds that cross component boundaries (see the state
//! machine's propagation policy): a step surfaces exactly one of these,
//! intentionally discarding the original cause so a post-recovery error
//! cannot be misread as the original failure.

use thiserror::Error;

/// Errors returned by the keyring fetcher, downloader and state machine.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// A required artifact is missing, unreachable, or failed to download.
    #[error("not found: {0}")]
    NotFound(String),

    /// A detached signature failed to verify, or its signer is blacklisted.
    #[error("signature error: {0}")]
    SignatureError(String),

    /// A keyring manifest failed a type/model/expiry check. Always fatal.
    #[error("keyring error: {0}")]
    KeyringError(String),

    /// Candidate generation found two bundles sharing the highest version.
    #[error("duplicate bundle version: {0}")]
    DuplicateBundleVersion(u64),

    /// Candidate generation could not find a delta's base image.
    #[error("missing base image: version {version} has no predecessor at {base}")]
    MissingBase {
        /// Version of the delta whose base could not be resolved.
        version: u64,
        /// Base version that was required but not found.
        base: u64,
    },
}

impl ResolverError {
    /// Construct a `NotFound` error from a displayable cause.
    pub fn not_found<D: std::fmt::Display>(cause: D) -> Self {
        ResolverError::NotFound(cause.to_string())
    }

    /// Construct a `SignatureError` from a displayable cause.
    pub fn signature<D: std::fmt::Display>(cause: D) -> Self {
        ResolverError::SignatureError(cause.to_string())
    }

    /// Construct a `KeyringError` from a displayable cause.
    pub fn keyring<D: std::fmt::Display>(cause: D) -> Self {
        ResolverError::KeyringError(cause.to_string())
    }
}

/// Internal fallible alias for plumbing that never crosses the three-kind
/// boundary (filesystem setup, JSON parsing failures re-wrapped upstream,
/// etc). Mirrors the teacher's own `Fallible` idiom but backed by `anyhow`.
pub type Fallible<T> = anyhow::Result<T>;
