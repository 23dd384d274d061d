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

//! Weighted scoring policy: pick one winning upgrade path from a list of
//! candidates. Lowest score wins.

use crate::model::UpgradePath;

const MIB: u64 = 1 << 20;

/// Score every candidate path. Lower is better.
///
/// `score = 100 * extra_reboots
///        + floor((total_bytes - min_bytes_across_candidates) / MiB)
///        + (max_version_across_candidates - destination_version)`
pub fn score(candidates: &[UpgradePath]) -> Vec<i64> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let max_version = candidates
        .iter()
        .filter_map(UpgradePath::destination_version)
        .max()
        .unwrap_or(0);
    let min_bytes = candidates
        .iter()
        .map(UpgradePath::total_bytes)
        .min()
        .unwrap_or(0);

    candidates
        .iter()
        .map(|path| {
            let reboots = path.extra_reboots() as i64;
            let bytes_over = (path.total_bytes() - min_bytes) / MIB;
            let destination = path.destination_version().unwrap_or(0);
            100 * reboots + bytes_over as i64 + (max_version - destination) as i64
        })
        .collect()
}

/// Choose the winning path: the candidate with the lowest score, ties
/// broken toward the earliest in `candidates`. Returns an empty path if
/// `candidates` is empty.
pub fn choose(candidates: &[UpgradePath]) -> UpgradePath {
    let scores = score(candidates);
    scores
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| **s)
        .map(|(i, _)| candidates[i].clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageFile;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn file(size: u64) -> ImageFile {
        ImageFile {
            path: "/x".into(),
            signature: "/x.asc".into(),
            checksum: "deadbeef".into(),
            size,
            order: 0,
        }
    }

    fn image(version: u64, bootme: bool, size: u64) -> crate::model::ImageRecord {
        crate::model::ImageRecord {
            content: "ubuntu".into(),
            version,
            base: None,
            description: String::new(),
            bootme,
            files: vec![file(size)],
            extra: Default::default(),
        }
    }

    fn path(images: Vec<crate::model::ImageRecord>) -> UpgradePath {
        UpgradePath { images }
    }

    #[test]
    fn empty_candidates_score_to_empty() {
        assert!(score(&[]).is_empty());
        assert!(choose(&[]).is_empty());
    }

    #[test]
    fn smaller_download_wins_on_tie() {
        // Two 1-image paths landing on the same version: the smaller one
        // should score lower (no reboot difference, same destination).
        let small = path(vec![image(20130301, false, 1)]);
        let large = path(vec![image(20130301, false, MIB + 1)]);
        let candidates = vec![small.clone(), large];
        let scores = score(&candidates);
        assert_eq!(scores[0], 0);
        assert_eq!(scores[1], 1);
        assert_eq!(choose(&candidates), small);
    }

    #[test]
    fn tie_breaks_toward_earlier_candidate() {
        let a = path(vec![image(20130301, false, 10 * MIB)]);
        let b = path(vec![image(20130301, false, 10 * MIB)]);
        let candidates = vec![a.clone(), b];
        assert_eq!(choose(&candidates), a);
    }

    #[test_case(0, 0)]
    #[test_case(1, 100)]
    #[test_case(3, 300)]
    fn reboot_count_dominates_score(reboots: usize, expected: i64) {
        let images = (0..reboots)
            .map(|i| image(20130300 + i as u64, true, 0))
            .collect();
        let candidates = vec![path(images)];
        assert_eq!(score(&candidates), vec![expected]);
    }

    #[test]
    fn scorer_tie_breaking_scenario() {
        // Three paths trading off reboots, bytes and destination version;
        // the middle path (index 1) wins despite not minimizing any single
        // term.
        let a = path(vec![image(20130200, true, 0), image(20130200, true, 0), image(20130204, false, 0)]);
        let b = path(vec![image(20130200, true, 0), image(20130304, false, 100 * MIB)]);
        let c = path(vec![image(20130203, false, 300 * MIB)]);

        let candidates = vec![a, b.clone(), c];
        let scores = score(&candidates);
        assert_eq!(scores, vec![300, 200, 401]);
        assert_eq!(choose(&candidates), b);
    }
}
