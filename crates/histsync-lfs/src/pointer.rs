// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Pointer file format
//!
//! A pointer file sits at `<original-name>.pointer` in the history tree in
//! place of a file whose content was uploaded as a release asset.
//!
//! ## Format
//!
//! ```text
//! version 1
//! hash sha256:4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393
//! size 524288000
//! filename footage.mov
//! release_tag lfs-assets
//! asset_name 4d7a214614ab-footage.mov
//! ```
//!
//! One `key value` pair per line; the value runs to the end of the line so
//! file names may contain spaces.

use crate::error::{LfsError, LfsResult};
use crate::hash::{parse_hash, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Pointer format version written by this crate
pub const POINTER_VERSION: u32 = 1;

/// File name suffix marking a pointer
pub const POINTER_SUFFIX: &str = ".pointer";

/// Upper bound on pointer file size; anything larger is real content
pub const MAX_POINTER_SIZE: usize = 1024;

const POINTER_HEADER: &str = "version ";

/// Number of hex characters of the digest used in asset names
pub const ASSET_PREFIX_LEN: usize = 12;

/// Metadata locating and verifying one externalized blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerFile {
    /// Format version
    pub version: u32,

    /// Content hash, `<algorithm>:<hex>`
    pub hash: String,

    /// Content size in bytes
    pub size: u64,

    /// Base name of the original file
    pub filename: String,

    /// Release holding the asset
    pub release_tag: String,

    /// Asset name inside the release
    pub asset_name: String,
}

impl PointerFile {
    /// Current-version pointer from its field values
    pub fn new(
        hash: impl Into<String>,
        size: u64,
        filename: impl Into<String>,
        release_tag: impl Into<String>,
        asset_name: impl Into<String>,
    ) -> Self {
        Self {
            version: POINTER_VERSION,
            hash: hash.into(),
            size,
            filename: filename.into(),
            release_tag: release_tag.into(),
            asset_name: asset_name.into(),
        }
    }

    /// Parses and validates a pointer from its text representation
    pub fn parse(content: &str) -> LfsResult<Self> {
        if content.len() > MAX_POINTER_SIZE {
            return Err(LfsError::InvalidPointerFormat(
                "Pointer file too large".to_string(),
            ));
        }

        let mut version: Option<u32> = None;
        let mut hash: Option<String> = None;
        let mut size: Option<u64> = None;
        let mut filename: Option<String> = None;
        let mut release_tag: Option<String> = None;
        let mut asset_name: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once(' ').ok_or_else(|| {
                LfsError::PointerParse(format!("Invalid line format: {}", line))
            })?;
            let value = value.trim();

            match key {
                "version" => {
                    version = Some(value.parse::<u32>().map_err(|e| {
                        LfsError::PointerParse(format!("Invalid version value: {}", e))
                    })?);
                }
                "hash" => {
                    parse_hash(value)?;
                    hash = Some(value.to_string());
                }
                "size" => {
                    size = Some(value.parse::<u64>().map_err(|e| {
                        LfsError::PointerParse(format!("Invalid size value: {}", e))
                    })?);
                }
                "filename" => filename = Some(value.to_string()),
                "release_tag" => release_tag = Some(value.to_string()),
                "asset_name" => asset_name = Some(value.to_string()),
                _ => {
                    return Err(LfsError::PointerParse(format!("Unknown field: {}", key)));
                }
            }
        }

        let missing = |field: &str| LfsError::MissingPointerField(field.to_string());
        let pointer = Self {
            version: version.ok_or_else(|| missing("version"))?,
            hash: hash.ok_or_else(|| missing("hash"))?,
            size: size.ok_or_else(|| missing("size"))?,
            filename: filename.ok_or_else(|| missing("filename"))?,
            release_tag: release_tag.ok_or_else(|| missing("release_tag"))?,
            asset_name: asset_name.ok_or_else(|| missing("asset_name"))?,
        };
        pointer.validate()?;
        Ok(pointer)
    }

    /// Checks field values that parsing alone does not constrain
    pub fn validate(&self) -> LfsResult<()> {
        if self.version == 0 || self.version > POINTER_VERSION {
            return Err(LfsError::InvalidPointerFormat(format!(
                "Unsupported pointer version: {}",
                self.version
            )));
        }
        parse_hash(&self.hash)?;
        for (field, value) in [
            ("filename", &self.filename),
            ("release_tag", &self.release_tag),
            ("asset_name", &self.asset_name),
        ] {
            if value.is_empty() {
                return Err(LfsError::MissingPointerField(field.to_string()));
            }
        }
        Ok(())
    }

    /// Fast check that doesn't do full parsing
    pub fn is_pointer(content: &str) -> bool {
        content.len() <= MAX_POINTER_SIZE
            && content.starts_with(POINTER_HEADER)
            && content.contains("\nhash ")
            && content.contains("\nasset_name ")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Digest algorithm named by the hash prefix
    pub fn algorithm(&self) -> LfsResult<HashAlgorithm> {
        parse_hash(&self.hash).map(|(algorithm, _)| algorithm)
    }

    /// Reads and parses the pointer at `path`
    pub async fn read(path: &Path) -> LfsResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Writes the pointer to `path`, replacing any previous content
    pub async fn write(&self, path: &Path) -> LfsResult<()> {
        tokio::fs::write(path, self.to_bytes()).await?;
        Ok(())
    }
}

impl fmt::Display for PointerFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {}\nhash {}\nsize {}\nfilename {}\nrelease_tag {}\nasset_name {}\n",
            self.version, self.hash, self.size, self.filename, self.release_tag, self.asset_name
        )
    }
}

/// Asset name for content `hash` of file `filename`
///
/// The first [`ASSET_PREFIX_LEN`] hex characters of the digest, a dash, then
/// the base name. Unchanged content under the same name maps to the same
/// asset, which is what makes re-uploads skippable.
///
/// Characters outside `[A-Za-z0-9._+-]` become `.`, the same substitution
/// the release host applies to uploaded names, so the recorded name is the
/// one a later lookup finds.
pub fn asset_name_for(hash: &str, filename: &str) -> String {
    let hex = hash.split_once(':').map_or(hash, |(_, hex)| hex);
    let prefix: String = hex.chars().take(ASSET_PREFIX_LEN).collect();
    let name: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-') {
                c
            } else {
                '.'
            }
        })
        .collect();
    format!("{}-{}", prefix, name)
}

/// `<path>.pointer`
pub fn pointer_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(POINTER_SUFFIX);
    PathBuf::from(name)
}

/// The file a pointer stands for, or `None` if the name lacks the suffix
pub fn logical_path_for(pointer_path: &Path) -> Option<PathBuf> {
    let name = pointer_path.file_name()?.to_str()?;
    let stem = name.strip_suffix(POINTER_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(pointer_path.with_file_name(stem))
}

/// Whether `path` is a pointer by name, size and header
///
/// Runs on the calling thread; used from directory walks.
pub fn is_pointer_file(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(POINTER_SUFFIX));
    if !named {
        return false;
    }
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() || meta.len() > MAX_POINTER_SIZE as u64 {
        return false;
    }
    let mut head = [0u8; POINTER_HEADER.len()];
    match std::fs::File::open(path).and_then(|mut f| f.read_exact(&mut head)) {
        Ok(()) => head == POINTER_HEADER.as_bytes(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_HASH: &str =
        "sha256:4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393";

    fn sample() -> PointerFile {
        PointerFile::new(
            VALID_HASH,
            524_288_000,
            "my footage.mov",
            "lfs-assets",
            "4d7a214614ab-my footage.mov",
        )
    }

    #[test]
    fn test_round_trip_exact() {
        let pointer = sample();
        let text = pointer.to_string();
        assert_eq!(PointerFile::parse(&text).unwrap(), pointer);
        assert_eq!(PointerFile::parse(&text).unwrap().to_string(), text);
    }

    #[test]
    fn test_parse_with_extra_whitespace() {
        let text = sample()
            .to_string()
            .lines()
            .map(|l| format!("  {}  ", l))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(PointerFile::parse(&text).unwrap(), sample());
    }

    #[test]
    fn test_parse_missing_asset_name() {
        let text = format!(
            "version 1\nhash {}\nsize 1\nfilename a\nrelease_tag t\n",
            VALID_HASH
        );
        assert!(matches!(
            PointerFile::parse(&text),
            Err(LfsError::MissingPointerField(f)) if f == "asset_name"
        ));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let base = sample().to_string();
        assert!(PointerFile::parse(&base.replace("size 524288000", "size lots")).is_err());
        assert!(PointerFile::parse(&base.replace("version 1", "version 9")).is_err());
        assert!(PointerFile::parse(&base.replace(VALID_HASH, "sha256:abc")).is_err());
        assert!(PointerFile::parse(&format!("{}color blue\n", base)).is_err());
        assert!(PointerFile::parse(&"x".repeat(MAX_POINTER_SIZE + 1)).is_err());
    }

    #[test]
    fn test_is_pointer() {
        assert!(PointerFile::is_pointer(&sample().to_string()));
        assert!(!PointerFile::is_pointer("This is just regular file content"));
    }

    #[test]
    fn test_asset_name_for() {
        assert_eq!(asset_name_for(VALID_HASH, "video.mp4"), "4d7a214614ab-video.mp4");
        assert_eq!(
            asset_name_for(VALID_HASH, "my footage (1).mov"),
            "4d7a214614ab-my.footage..1..mov"
        );
        assert_eq!(asset_name_for(VALID_HASH, "été.wav"), "4d7a214614ab-.t..wav");
    }

    #[test]
    fn test_pointer_and_logical_paths() {
        let p = pointer_path_for(Path::new("/hist/a/video.mp4"));
        assert_eq!(p, PathBuf::from("/hist/a/video.mp4.pointer"));
        assert_eq!(logical_path_for(&p), Some(PathBuf::from("/hist/a/video.mp4")));
        assert_eq!(logical_path_for(Path::new("/hist/a/video.mp4")), None);
        assert_eq!(logical_path_for(Path::new("/hist/.pointer")), None);
    }

    #[tokio::test]
    async fn test_file_round_trip_and_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4.pointer");
        sample().write(&path).await.unwrap();
        assert_eq!(PointerFile::read(&path).await.unwrap(), sample());
        assert!(is_pointer_file(&path));

        let fake = dir.path().join("notes.pointer");
        std::fs::write(&fake, "just text").unwrap();
        assert!(!is_pointer_file(&fake));

        let unnamed = dir.path().join("video.txt");
        sample().write(&unnamed).await.unwrap();
        assert!(!is_pointer_file(&unnamed));
    }
}
