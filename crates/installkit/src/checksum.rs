//! Checksum manifests and digest verification.
//!
//! Upstream projects publish checksums in two shapes:
//!
//! - **Multi-file** manifests list `<hex>  <filename>` pairs for several
//!   artifacts (`runc.sha256sum`, etcd's `SHA256SUMS`). The entry for the
//!   downloaded file must be isolated by name; a line for another file never
//!   counts.
//! - **Single-hash** manifests hold one digest for one file (`kubelet.sha256`
//!   on dl.k8s.io). Any filename next to the digest is ignored and the digest
//!   is paired with the local file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Digest algorithm used by a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256 (64 hex characters).
    #[default]
    Sha256,
    /// SHA-512 (128 hex characters).
    Sha512,
}

impl DigestAlgorithm {
    /// Length of a hex-encoded digest.
    #[must_use]
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha512 => f.write_str("sha512"),
        }
    }
}

/// Layout of a checksum manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestFormat {
    /// `<hex>  <filename>` lines; the entry is selected by file name.
    MultiFile,
    /// A single digest for the downloaded file.
    SingleHash,
}

/// Per-component rule for reading its checksum manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumRule {
    /// Manifest layout.
    pub format: ManifestFormat,
    /// Digest algorithm.
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
}

impl ChecksumRule {
    /// SHA-256 multi-file manifest.
    #[must_use]
    pub fn multi_file() -> Self {
        Self {
            format: ManifestFormat::MultiFile,
            algorithm: DigestAlgorithm::Sha256,
        }
    }

    /// SHA-256 single-hash manifest.
    #[must_use]
    pub fn single_hash() -> Self {
        Self {
            format: ManifestFormat::SingleHash,
            algorithm: DigestAlgorithm::Sha256,
        }
    }
}

/// Find the expected digest for `file_name` in a manifest.
///
/// Returns `None` when the manifest has no entry for the file (multi-file)
/// or is empty (single-hash). The digest is returned lowercased but not
/// otherwise validated.
#[must_use]
pub fn expected_digest(manifest: &str, format: ManifestFormat, file_name: &str) -> Option<String> {
    let mut entries = manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));

    match format {
        ManifestFormat::SingleHash => entries
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(str::to_ascii_lowercase),
        ManifestFormat::MultiFile => entries.find_map(|line| {
            let mut parts = line.splitn(2, char::is_whitespace);
            let digest = parts.next()?;
            let name = parts.next()?.trim();
            // `sha256sum -b` marks binary mode with a leading '*'.
            let name = name.strip_prefix('*').unwrap_or(name);
            let name = name.strip_prefix("./").unwrap_or(name);
            let base = name.rsplit('/').next().unwrap_or(name);
            (base == file_name).then(|| digest.to_ascii_lowercase())
        }),
    }
}

/// Compute the hex digest of a byte slice.
#[must_use]
pub fn digest_bytes(data: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => to_hex(&Sha256::digest(data)),
        DigestAlgorithm::Sha512 => to_hex(&Sha512::digest(data)),
    }
}

/// Compute the hex digest of a file, streaming its contents.
pub fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> io::Result<String> {
    let file = File::open(path)?;
    match algorithm {
        DigestAlgorithm::Sha256 => hash_reader::<Sha256>(file),
        DigestAlgorithm::Sha512 => hash_reader::<Sha512>(file),
    }
}

fn hash_reader<D: Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_hex_digest(digest: &str, algorithm: DigestAlgorithm) -> bool {
    digest.len() == algorithm.hex_len() && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Verify `file` against `manifest`.
///
/// `file_name` is the name the manifest is searched for; for single-hash
/// manifests it is only used in error messages.
///
/// # Errors
///
/// Returns `Error::ChecksumMismatch` when the manifest has no usable entry
/// for the file or the digests differ, and `Error::Io` when the file cannot
/// be read.
pub fn verify(
    component: &str,
    rule: &ChecksumRule,
    file: &Path,
    file_name: &str,
    manifest: &str,
) -> Result<()> {
    let actual = digest_file(file, rule.algorithm).map_err(|e| Error::io(file, e))?;

    let expected = expected_digest(manifest, rule.format, file_name);
    let matches = expected
        .as_deref()
        .is_some_and(|digest| is_hex_digest(digest, rule.algorithm) && digest == actual);

    if matches {
        log::debug!(target: component, "{} {} verified for {}", rule.algorithm, actual, file_name);
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            component: component.to_string(),
            file: file_name.to_string(),
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"#!/bin/sh\necho 'runc version 1.1.12'\n";

    fn sha256(data: &[u8]) -> String {
        digest_bytes(data, DigestAlgorithm::Sha256)
    }

    fn write_temp(data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact");
        std::fs::write(&path, data).unwrap();
        (dir, path)
    }

    #[test]
    fn test_digest_bytes_known_value() {
        assert_eq!(
            sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digest_bytes(b"", DigestAlgorithm::Sha512).len(), 128);
    }

    #[test]
    fn test_digest_file_matches_bytes() {
        let (_dir, path) = write_temp(DATA);
        assert_eq!(
            digest_file(&path, DigestAlgorithm::Sha256).unwrap(),
            sha256(DATA)
        );
        assert_eq!(
            digest_file(&path, DigestAlgorithm::Sha512).unwrap(),
            digest_bytes(DATA, DigestAlgorithm::Sha512)
        );
    }

    #[test]
    fn test_multi_file_selects_by_name() {
        let manifest = "\
1111111111111111111111111111111111111111111111111111111111111111  runc.arm64
2222222222222222222222222222222222222222222222222222222222222222  runc.amd64
3333333333333333333333333333333333333333333333333333333333333333  libseccomp-2.5.5.tar.gz
";
        assert_eq!(
            expected_digest(manifest, ManifestFormat::MultiFile, "runc.amd64").as_deref(),
            Some("2222222222222222222222222222222222222222222222222222222222222222")
        );
        assert_eq!(
            expected_digest(manifest, ManifestFormat::MultiFile, "runc.s390x"),
            None
        );
    }

    #[test]
    fn test_multi_file_binary_marker_and_paths() {
        let manifest = "ABCDEF  *./release/etcd-v3.5.15-linux-amd64.tar.gz\n";
        assert_eq!(
            expected_digest(
                manifest,
                ManifestFormat::MultiFile,
                "etcd-v3.5.15-linux-amd64.tar.gz"
            )
            .as_deref(),
            Some("abcdef")
        );
    }

    #[test]
    fn test_multi_file_requires_exact_name() {
        // A prefix match on another artifact must not count.
        let manifest = "aaaa  containerd-1.7.19-linux-amd64.tar.gz.sig\n";
        assert_eq!(
            expected_digest(
                manifest,
                ManifestFormat::MultiFile,
                "containerd-1.7.19-linux-amd64.tar.gz"
            ),
            None
        );
    }

    #[test]
    fn test_single_hash_ignores_name() {
        assert_eq!(
            expected_digest("abc123  -\n", ManifestFormat::SingleHash, "kubelet").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            expected_digest("ABC123", ManifestFormat::SingleHash, "kubelet").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            expected_digest("\n\n", ManifestFormat::SingleHash, "kubelet"),
            None
        );
    }

    #[test]
    fn test_verify_multi_file_ok() {
        let (_dir, path) = write_temp(DATA);
        let manifest = format!(
            "{}  runc.arm64\n{}  runc.amd64\n",
            "0".repeat(64),
            sha256(DATA)
        );
        verify("runc", &ChecksumRule::multi_file(), &path, "runc.amd64", &manifest).unwrap();
    }

    #[test]
    fn test_verify_single_hash_uppercase_ok() {
        let (_dir, path) = write_temp(DATA);
        let manifest = sha256(DATA).to_uppercase();
        verify("kubelet", &ChecksumRule::single_hash(), &path, "kubelet", &manifest).unwrap();
    }

    #[test]
    fn test_verify_mismatch() {
        let (_dir, path) = write_temp(DATA);
        let manifest = format!("{}  runc.amd64\n", "0".repeat(64));
        let err = verify("runc", &ChecksumRule::multi_file(), &path, "runc.amd64", &manifest)
            .unwrap_err();
        match err {
            Error::ChecksumMismatch {
                component,
                expected,
                actual,
                ..
            } => {
                assert_eq!(component, "runc");
                assert_eq!(expected, Some("0".repeat(64)));
                assert_eq!(actual, sha256(DATA));
            }
            other => panic!("Expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_missing_entry_is_mismatch() {
        let (_dir, path) = write_temp(DATA);
        let manifest = format!("{}  runc.arm64\n", sha256(DATA));
        let err = verify("runc", &ChecksumRule::multi_file(), &path, "runc.amd64", &manifest)
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { expected: None, .. }));
    }

    #[test]
    fn test_verify_rejects_wrong_algorithm_length() {
        let (_dir, path) = write_temp(DATA);
        let rule = ChecksumRule {
            format: ManifestFormat::SingleHash,
            algorithm: DigestAlgorithm::Sha512,
        };
        // A sha256 digest can never satisfy a sha512 rule.
        let err = verify("crictl", &rule, &path, "crictl", &sha256(DATA)).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_rule_deserialize_default_algorithm() {
        let rule: ChecksumRule = toml::from_str(r#"format = "single-hash""#).unwrap();
        assert_eq!(rule, ChecksumRule::single_hash());
    }
}
