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

//! Typed records decoded from the keyring manifest, channels descriptor and
//! image index JSON documents. Unknown fields are preserved in `extra` so a
//! future schema revision doesn't silently lose data on round-trip.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

/// The five keyring slots a `KeyringStore` owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum KeyringType {
    /// The root of trust, pre-provisioned on the device.
    ArchiveMaster,
    /// Rotatable key signed by archive-master.
    ImageMaster,
    /// Rotatable key signed by image-master.
    ImageSigning,
    /// Optional per-device key signed by image-signing.
    DeviceSigning,
    /// Fingerprints that must be treated as invalid even if trusted.
    Blacklist,
}

/// Manifest embedded in a keyring tarball as `keyring.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringDescriptor {
    /// Keyring type; must match what the fetcher expected.
    #[serde(rename = "type")]
    pub keyring_type: KeyringType,

    /// Device model this keyring is pinned to, if any.
    #[serde(default)]
    pub model: Option<String>,

    /// UTC epoch seconds after which this keyring is no longer valid.
    #[serde(default)]
    pub expiry: Option<i64>,
}

impl KeyringDescriptor {
    /// Whether the keyring has expired as of `now` (UTC epoch seconds).
    ///
    /// `expiry == now` counts as expired: validity requires strictly
    /// greater than the current time.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.expiry {
            None => false,
            Some(expiry) => now >= expiry,
        }
    }
}

/// A single channel/device entry in the channels descriptor: where to find
/// the device's index, and optionally a device-specific signing keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceChannelEntry {
    /// URL path to this device's `index.json`.
    pub index: String,

    /// Reference to a device-specific signing keyring, if declared.
    #[serde(default)]
    pub keyring: Option<DeviceKeyringRef>,

    /// Unrecognized fields, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// URL paths for a device-specific keyring tarball and its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKeyringRef {
    /// URL path to the keyring tarball.
    pub path: String,
    /// URL path to the detached signature.
    pub signature: String,
}

/// `channels.json`: channel name -> device name -> entry.
pub type ChannelsDescriptor = BTreeMap<String, BTreeMap<String, DeviceChannelEntry>>;

/// One file belonging to an image, as listed in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    /// URL path to the file's contents.
    pub path: String,
    /// URL path to the file's detached signature.
    pub signature: String,
    /// Checksum of the file, as published (algorithm implied by format).
    pub checksum: String,
    /// Size in bytes.
    pub size: u64,
    /// Application order among the files of the same image.
    pub order: i64,
}

/// Whether an image record is a full image or a delta from a base version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Standalone image requiring no predecessor.
    Full,
    /// Image that advances from `base` to `version`.
    Delta {
        /// Version this delta patches from.
        base: u64,
    },
}

/// Identity of an image record, used for equality/hashing (see §4.3): a
/// full image's identity is its version; a delta's identity is
/// `(version, base)`. A full and a delta at the same version are never
/// equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageIdentity {
    /// Identity of a full image: its version.
    Full(u64),
    /// Identity of a delta image: `(version, base)`.
    Delta(u64, u64),
}

/// A single entry from the index's `images` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Content kind this image belongs to (e.g. "ubuntu", "device").
    /// Disambiguates images when a single index serves more than one
    /// content kind, per the bundle's content-kind -> version mapping.
    #[serde(default)]
    pub content: String,

    /// Version this image advances to.
    pub version: u64,

    /// `Some(base)` for a delta image, `None` for a full image.
    #[serde(default)]
    pub base: Option<u64>,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Whether applying this image requires an extra reboot.
    #[serde(default)]
    pub bootme: bool,

    /// Files belonging to this image, in application order.
    pub files: Vec<ImageFile>,

    /// Unrecognized fields, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ImageRecord {
    /// The image's kind (full or delta), derived from `base`.
    pub fn kind(&self) -> ImageKind {
        match self.base {
            Some(base) => ImageKind::Delta { base },
            None => ImageKind::Full,
        }
    }

    /// Identity used for equality/hashing; see `ImageIdentity`.
    pub fn identity(&self) -> ImageIdentity {
        match self.kind() {
            ImageKind::Full => ImageIdentity::Full(self.version),
            ImageKind::Delta { base } => ImageIdentity::Delta(self.version, base),
        }
    }

    /// Total size in bytes of all files belonging to this image.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

impl PartialEq for ImageRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}
impl Eq for ImageRecord {}

impl std::hash::Hash for ImageRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

/// A bundle: a named combination of per-content-kind target image versions,
/// at a single overall version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Overall bundle version.
    pub version: u64,
    /// Content kind -> target image version.
    pub images: BTreeMap<String, u64>,
}

/// The `global` section of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexGlobal {
    /// Timestamp the index was generated, as published (e.g. RFC 2822-ish
    /// `Day Mon DD HH:MM:SS UTC YYYY`). Kept as an opaque string; the core
    /// never needs to parse it, only to pass it through.
    pub generated_at: String,
}

/// The device-specific image index (`index.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Global metadata.
    pub global: IndexGlobal,
    /// Bundles offered by this index.
    pub bundles: Vec<Bundle>,
    /// All images referenced by any bundle or delta chain.
    pub images: Vec<ImageRecord>,
}

impl Index {
    /// Every image record of the given content kind sitting at `version`,
    /// in document order (full and delta images can coexist at the same
    /// version, keyed apart by their `base`).
    pub fn images_at<'a>(&'a self, content: &'a str, version: u64) -> impl Iterator<Item = &'a ImageRecord> {
        self.images
            .iter()
            .filter(move |img| img.content == content && img.version == version)
    }
}

/// An upgrade path: an ordered, oldest-to-newest sequence of image records
/// that, applied in order from the current version, reaches the newest
/// bundle's target version for some content kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradePath {
    /// Images to apply, oldest first.
    pub images: Vec<ImageRecord>,
}

impl UpgradePath {
    /// Total size in bytes across every file of every image in the path.
    pub fn total_bytes(&self) -> u64 {
        self.images.iter().map(ImageRecord::total_bytes).sum()
    }

    /// Count of images in the path with `bootme` set (the implicit
    /// end-of-update reboot is never counted here).
    pub fn extra_reboots(&self) -> u64 {
        self.images.iter().filter(|img| img.bootme).count() as u64
    }

    /// Version of the last image in the path, or `None` if empty.
    pub fn destination_version(&self) -> Option<u64> {
        self.images.last().map(|img| img.version)
    }

    /// Whether the path has no images.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
