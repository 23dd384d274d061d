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

//! Detached OpenPGP signature verification, with blacklist support.

use crate::errors::ResolverError;
use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Verifies a detached signature against a set of pinned keyrings, rejecting
/// any signer whose fingerprint is present in a loaded blacklist.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `data`, accepting a signer from any of
    /// `keyrings`. Fails with `SignatureError` if no keyring's key produced
    /// a valid signature, or if the signer is blacklisted.
    fn verify(
        &self,
        keyrings: &[PathBuf],
        blacklist: Option<&Path>,
        data: &Path,
        signature: &Path,
    ) -> Result<(), ResolverError>;
}

/// Default `SignatureVerifier`, backed by the `pgp` crate.
#[derive(Debug, Default)]
pub struct RpgpVerifier;

impl RpgpVerifier {
    /// Construct a verifier.
    pub fn new() -> Self {
        RpgpVerifier
    }

    fn load_keyring(path: &Path) -> Result<Vec<SignedPublicKey>, ResolverError> {
        let file = File::open(path).map_err(ResolverError::keyring)?;
        let mut keys = Vec::new();
        for key in SignedPublicKey::from_reader_many(BufReader::new(file)).map_err(ResolverError::keyring)? {
            keys.push(key.map_err(ResolverError::keyring)?);
        }
        Ok(keys)
    }

    fn blacklisted_fingerprints(blacklist: Option<&Path>) -> Result<Vec<Vec<u8>>, ResolverError> {
        match blacklist {
            None => Ok(Vec::new()),
            Some(path) => Ok(Self::load_keyring(path)?
                .into_iter()
                .map(|key| key.fingerprint().as_bytes().to_vec())
                .collect()),
        }
    }
}

impl SignatureVerifier for RpgpVerifier {
    fn verify(
        &self,
        keyrings: &[PathBuf],
        blacklist: Option<&Path>,
        data: &Path,
        signature: &Path,
    ) -> Result<(), ResolverError> {
        let sig_file = File::open(signature).map_err(ResolverError::signature)?;
        let (standalone, _) = StandaloneSignature::from_armor_single(BufReader::new(sig_file))
            .map_err(ResolverError::signature)?;

        let content = std::fs::read(data).map_err(ResolverError::signature)?;
        let blacklisted = Self::blacklisted_fingerprints(blacklist)?;

        for keyring_path in keyrings {
            for key in Self::load_keyring(keyring_path)? {
                if blacklisted.contains(&key.fingerprint().as_bytes().to_vec()) {
                    continue;
                }
                if standalone.verify(&key, &content).is_ok() {
                    return Ok(());
                }
            }
        }
        Err(ResolverError::SignatureError(format!(
            "no pinned key verified signature {}",
            signature.display()
        )))
    }
}
