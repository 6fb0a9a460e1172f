// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model artifact references.
//!
//! An [`ArtifactRef`] ties a remote identifier (for the HTTP fetcher, a URL)
//! to the local cache path it downloads to. The mapping is stable: the same
//! identifier always resolves to the same cache path, and distinct identifiers
//! resolve to distinct paths. Presence of the cache path is the only signal of
//! "already fetched" — there is no checksum; a corrupt cached file is caught
//! at load or schema-validation time and cleared with
//! [`Provisioner::invalidate`](crate::provisioner::Provisioner::invalidate).

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DetectError, Result};

/// A remote model artifact and its local cache location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    identifier: String,
    cache_path: PathBuf,
}

impl ArtifactRef {
    /// Create a reference with an explicit cache path.
    ///
    /// # Errors
    ///
    /// Returns a config error if the identifier is empty. No other format
    /// validation is performed; the fetch protocol owns identifier semantics.
    pub fn new<S: Into<String>, P: Into<PathBuf>>(identifier: S, cache_path: P) -> Result<Self> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(DetectError::Config(
                "artifact identifier must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            identifier,
            cache_path: cache_path.into(),
        })
    }

    /// Create a reference whose cache path is derived from the identifier,
    /// inside `cache_dir`.
    ///
    /// The file name combines the identifier's last path segment with a hash
    /// of the full identifier, so `.../v1/best.onnx` and `.../v2/best.onnx`
    /// cache to different files.
    ///
    /// # Errors
    ///
    /// Returns a config error if the identifier is empty.
    pub fn resolve<P: AsRef<Path>>(identifier: &str, cache_dir: P) -> Result<Self> {
        if identifier.is_empty() {
            return Err(DetectError::Config(
                "artifact identifier must be non-empty".to_string(),
            ));
        }
        let file_name = cache_file_name(identifier);
        Ok(Self {
            identifier: identifier.to_string(),
            cache_path: cache_dir.as_ref().join(file_name),
        })
    }

    /// The remote identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The local cache path this artifact downloads to.
    #[must_use]
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Whether a file is present at the cache path.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache_path.exists()
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.identifier, self.cache_path.display())
    }
}

/// Derive a stable cache file name from an identifier.
fn cache_file_name(identifier: &str) -> String {
    // Last non-empty path segment, with any query string stripped
    let segment = identifier
        .split('/')
        .rev()
        .find(|s| !s.is_empty())
        .unwrap_or(identifier);
    let segment = segment.split('?').next().unwrap_or(segment);

    let sanitized: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let (stem, ext) = match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
        _ => (sanitized, String::new()),
    };
    let stem = if stem.is_empty() {
        "model".to_string()
    } else {
        stem
    };

    format!("{stem}-{:08x}{ext}", fnv1a64(identifier) & 0xffff_ffff)
}

/// FNV-1a 64-bit hash. Deterministic across runs and toolchains, which keeps
/// the identifier-to-path mapping stable.
fn fnv1a64(s: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(ArtifactRef::resolve("", "/tmp/cache").is_err());
        assert!(ArtifactRef::new("", "/tmp/cache/m.onnx").is_err());
    }

    #[test]
    fn test_mapping_is_stable() {
        let a = ArtifactRef::resolve("https://example.com/models/best.onnx", "/cache").unwrap();
        let b = ArtifactRef::resolve("https://example.com/models/best.onnx", "/cache").unwrap();
        assert_eq!(a.cache_path(), b.cache_path());
    }

    #[test]
    fn test_distinct_identifiers_map_to_distinct_paths() {
        let a = ArtifactRef::resolve("https://example.com/v1/best.onnx", "/cache").unwrap();
        let b = ArtifactRef::resolve("https://example.com/v2/best.onnx", "/cache").unwrap();
        assert_ne!(a.cache_path(), b.cache_path());
    }

    #[test]
    fn test_file_name_keeps_extension() {
        let name = cache_file_name("https://example.com/models/best.onnx?token=abc");
        assert!(name.starts_with("best-"), "{name}");
        assert!(name.ends_with(".onnx"), "{name}");
    }

    #[test]
    fn test_file_name_without_segment() {
        let name = cache_file_name("https://example.com/");
        assert!(!name.is_empty());
    }

    #[test]
    fn test_fnv1a64_known_values() {
        // FNV-1a reference vectors
        assert_eq!(fnv1a64(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64("a"), 0xaf63_dc4c_8601_ec8c);
    }
}
