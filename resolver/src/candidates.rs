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

//! Enumerate every valid upgrade chain from the device's current version to
//! the newest bundle's target version for a given content kind.

use crate::errors::ResolverError;
use crate::model::{Index, ImageRecord, UpgradePath};

/// Compute all candidate upgrade paths for `content` from `current_version`
/// to the newest bundle's target version.
///
/// Returns an empty list if there are no bundles, or if `current_version`
/// already matches the target. Fails with `DuplicateBundleVersion` if two
/// bundles share the highest version, or with `MissingBase` if a delta's
/// predecessor cannot be found before reaching `current_version`.
pub fn candidates(
    index: &Index,
    current_version: u64,
    content: &str,
) -> Result<Vec<UpgradePath>, ResolverError> {
    if index.bundles.is_empty() {
        return Ok(Vec::new());
    }

    let mut sorted: Vec<&crate::model::Bundle> = index.bundles.iter().collect();
    sorted.sort_by_key(|b| b.version);
    let newest = sorted.pop().expect("non-empty bundle list");
    if let Some(runner_up) = sorted.last() {
        if runner_up.version == newest.version {
            return Err(ResolverError::DuplicateBundleVersion(newest.version));
        }
    }

    let target_version = match newest.images.get(content) {
        Some(version) => *version,
        None => return Ok(Vec::new()),
    };

    if current_version == target_version {
        return Ok(Vec::new());
    }

    scan(index, content, current_version, target_version)
}

/// Walk backward from every image at `target_version` to `current_version`,
/// one linear chain per starting point.
fn scan(
    index: &Index,
    content: &str,
    current_version: u64,
    target_version: u64,
) -> Result<Vec<UpgradePath>, ResolverError> {
    let starting_points: Vec<&ImageRecord> = index.images_at(content, target_version).collect();

    let mut paths = Vec::new();
    for start in starting_points {
        let mut path: Vec<ImageRecord> = Vec::new();
        let mut here = start;
        loop {
            if here.version == current_version {
                break;
            }
            path.push(here.clone());
            let base = match here.base {
                None => break, // full image terminates the walk
                Some(base) => base,
            };
            if base == current_version {
                break;
            }
            here = index
                .images_at(content, base)
                .next()
                .ok_or(ResolverError::MissingBase {
                    version: here.version,
                    base,
                })?;
        }
        if !path.is_empty() {
            path.reverse();
            paths.push(UpgradePath { images: path });
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bundle, ImageFile, IndexGlobal};
    use std::collections::BTreeMap;

    fn file(size: u64) -> ImageFile {
        ImageFile {
            path: "/x".into(),
            signature: "/x.asc".into(),
            checksum: "deadbeef".into(),
            size,
            order: 0,
        }
    }

    fn full(content: &str, version: u64, size: u64) -> ImageRecord {
        ImageRecord {
            content: content.to_string(),
            version,
            base: None,
            description: String::new(),
            bootme: false,
            files: vec![file(size)],
            extra: Default::default(),
        }
    }

    fn delta(content: &str, version: u64, base: u64, size: u64) -> ImageRecord {
        ImageRecord {
            content: content.to_string(),
            version,
            base: Some(base),
            description: String::new(),
            bootme: false,
            files: vec![file(size)],
            extra: Default::default(),
        }
    }

    fn bundle(version: u64, kind: &str, image_version: u64) -> Bundle {
        let mut images = BTreeMap::new();
        images.insert(kind.to_string(), image_version);
        Bundle { version, images }
    }

    fn index(bundles: Vec<Bundle>, images: Vec<ImageRecord>) -> Index {
        Index {
            global: IndexGlobal {
                generated_at: "Thu Apr 11 15:01:46 UTC 2013".into(),
            },
            bundles,
            images,
        }
    }

    #[test]
    fn no_bundles_means_no_update() {
        let idx = index(vec![], vec![]);
        let result = candidates(&idx, 20130301, "ubuntu").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn duplicate_bundle_version_fails() {
        let idx = index(
            vec![
                bundle(20130304, "ubuntu", 20130304),
                bundle(20130304, "ubuntu", 20130304),
            ],
            vec![],
        );
        let err = candidates(&idx, 20130301, "ubuntu").unwrap_err();
        assert!(matches!(err, ResolverError::DuplicateBundleVersion(20130304)));
    }

    #[test]
    fn terminates_on_match() {
        let idx = index(
            vec![bundle(20130304, "ubuntu", 20130301)],
            vec![full("ubuntu", 20130301, 100)],
        );
        let result = candidates(&idx, 20130301, "ubuntu").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn single_delta_and_full_both_candidates() {
        let idx = index(
            vec![bundle(20130304, "ubuntu", 20130301)],
            vec![
                full("ubuntu", 20130301, 500_000_000),
                delta("ubuntu", 20130301, 20130300, 10_000_000),
            ],
        );
        let result = candidates(&idx, 20130300, "ubuntu").unwrap();
        assert_eq!(result.len(), 2);
        for path in &result {
            assert_eq!(path.images.len(), 1);
            assert_eq!(path.destination_version(), Some(20130301));
        }
    }

    #[test]
    fn delta_chain_walks_back_through_bases() {
        let idx = index(
            vec![bundle(20130304, "ubuntu", 20130302)],
            vec![
                full("ubuntu", 20130300, 100),
                delta("ubuntu", 20130301, 20130300, 10),
                delta("ubuntu", 20130302, 20130301, 10),
            ],
        );
        let result = candidates(&idx, 20130300, "ubuntu").unwrap();
        assert_eq!(result.len(), 1);
        let path = &result[0];
        assert_eq!(path.images.len(), 2);
        assert_eq!(path.images[0].version, 20130301);
        assert_eq!(path.images[1].version, 20130302);
    }

    #[test]
    fn missing_base_fails() {
        let idx = index(
            vec![bundle(20130304, "android", 20130301)],
            vec![delta("android", 20130301, 20130300, 10)],
        );
        let err = candidates(&idx, 20130200, "android").unwrap_err();
        assert!(matches!(
            err,
            ResolverError::MissingBase {
                version: 20130301,
                base: 20130300
            }
        ));
    }

    #[test]
    fn image_equality_ignores_content_full_vs_delta() {
        let f = full("ubuntu", 20130301, 1);
        let d = delta("ubuntu", 20130301, 20130300, 1);
        assert_ne!(f, d);

        let f2 = full("android", 20130301, 999);
        assert_eq!(f, f2);

        let d2 = delta("android", 20130301, 20130300, 999);
        assert_eq!(d, d2);
    }
}
