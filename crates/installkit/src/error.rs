//! Error types for component installation.
//!
//! Every error names the component it belongs to and maps to the [`Stage`]
//! at which the run stopped, so a failure in the log reads as
//! "containerd failed at download-checksum" rather than a bare I/O message.
//! Errors are also categorized so callers can tell a network problem from a
//! corrupted download from a full disk.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for installer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The stage of an install run at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Spec validation and scratch directory setup.
    Prepare,
    /// Fetching the binary artifact.
    DownloadBinary,
    /// Fetching the checksum manifest.
    DownloadChecksum,
    /// Comparing the artifact digest with the manifest. Logged as
    /// `checksum-mismatch`, the name operators query failures by.
    Verify,
    /// Unpacking a tar.gz artifact.
    Extract,
    /// Placing the binaries at their install path.
    Install,
}

impl Stage {
    /// Stable identifier used in log records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::DownloadBinary => "download-binary",
            Self::DownloadChecksum => "download-checksum",
            Self::Verify => "checksum-mismatch",
            Self::Extract => "extract",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which artifact a download was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// The binary or archive itself.
    Binary,
    /// The checksum manifest.
    Checksum,
}

impl Artifact {
    /// The stage that downloads this artifact.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Binary => Stage::DownloadBinary,
            Self::Checksum => Stage::DownloadChecksum,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("binary"),
            Self::Checksum => f.write_str("checksum"),
        }
    }
}

/// Categories of installer errors.
///
/// Error categories help decide what kind of operator feedback is
/// appropriate. The installer itself never retries; an outer scheduler may
/// use [`ErrorCategory::is_retryable`] to decide whether another boot attempt
/// is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// Digest did not match the manifest.
    Integrity,
    /// Malformed archive or manifest.
    Format,
    /// Permission denied while writing.
    Permission,
    /// Invalid component specification or platform.
    Config,
    /// The run was cancelled.
    Cancelled,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Integrity => "Checksum verification failed",
            Self::Format => "Invalid archive or manifest",
            Self::Permission => "Permission denied",
            Self::Config => "Invalid component configuration",
            Self::Cancelled => "Cancelled",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check connectivity to the download repository and try again",
            Self::Integrity => {
                "The download may be corrupted or tampered with; check the repository and version"
            }
            Self::Format => "The archive layout may have changed; check the configured members",
            Self::Permission => "Run as root or choose a writable install path",
            Self::Config => "Fix the component definition in the configuration file",
            Self::Cancelled => "Run the install again",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while ensuring a component is installed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Downloading the binary or the checksum manifest failed.
    #[error("{component}: {artifact} download failed: {message}")]
    DownloadFailed {
        /// Component being installed.
        component: String,
        /// Which artifact failed.
        artifact: Artifact,
        /// Error message.
        message: String,
        /// HTTP status code if the server answered.
        status: Option<u16>,
    },

    /// The artifact digest does not match the manifest, or the manifest has
    /// no entry for the artifact.
    #[error(
        "{component}: checksum mismatch for {file} (expected {}, got {actual})",
        .expected.as_deref().unwrap_or("no manifest entry")
    )]
    ChecksumMismatch {
        /// Component being installed.
        component: String,
        /// File name the digest was looked up for.
        file: String,
        /// Digest listed in the manifest.
        expected: Option<String>,
        /// Digest computed from the downloaded file.
        actual: String,
    },

    /// The archive is malformed or lacks an expected member.
    #[error("{component}: extraction failed: {message}")]
    ExtractionFailed {
        /// Component being installed.
        component: String,
        /// Error message.
        message: String,
    },

    /// Writing a binary to its install path failed.
    #[error("{component}: install failed at {path}: {source}")]
    InstallIoFailed {
        /// Component being installed.
        component: String,
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The run was cancelled before reaching `stage`.
    #[error("{component}: cancelled during {stage}")]
    Cancelled {
        /// Component being installed.
        component: String,
        /// Stage that was about to run or was running.
        stage: Stage,
    },

    /// The component specification is invalid.
    #[error("{component}: invalid specification: {message}")]
    InvalidSpec {
        /// Component name (may be empty when the name itself is invalid).
        component: String,
        /// What is wrong.
        message: String,
    },

    /// The current platform has no known architecture name.
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system.
        os: String,
        /// CPU architecture.
        arch: String,
    },

    /// IO error outside the install step (scratch space, manifest read).
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid specification error.
    pub fn invalid_spec(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            component: component.into(),
            message: message.into(),
        }
    }

    /// The stage this error stopped the run at.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Error::DownloadFailed { artifact, .. } => artifact.stage(),
            Error::ChecksumMismatch { .. } => Stage::Verify,
            Error::ExtractionFailed { .. } => Stage::Extract,
            Error::InstallIoFailed { .. } => Stage::Install,
            Error::Cancelled { stage, .. } => *stage,
            Error::InvalidSpec { .. } | Error::UnsupportedPlatform { .. } | Error::Io { .. } => {
                Stage::Prepare
            }
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DownloadFailed { status, .. } => match status {
                Some(code) if (400..500).contains(code) && *code != 408 && *code != 429 => {
                    ErrorCategory::Config
                }
                _ => ErrorCategory::Network,
            },
            Error::ChecksumMismatch { .. } => ErrorCategory::Integrity,
            Error::ExtractionFailed { .. } => ErrorCategory::Format,
            Error::InstallIoFailed { source, .. } | Error::Io { source, .. } => {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    ErrorCategory::Permission
                } else {
                    ErrorCategory::Other
                }
            }
            Error::Cancelled { .. } => ErrorCategory::Cancelled,
            Error::InvalidSpec { .. } | Error::UnsupportedPlatform { .. } => ErrorCategory::Config,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(artifact: Artifact, status: Option<u16>) -> Error {
        Error::DownloadFailed {
            component: "runc".to_string(),
            artifact,
            message: "boom".to_string(),
            status,
        }
    }

    #[test]
    fn test_stage_identifiers() {
        assert_eq!(Stage::DownloadBinary.to_string(), "download-binary");
        assert_eq!(Stage::DownloadChecksum.to_string(), "download-checksum");
        assert_eq!(Stage::Verify.as_str(), "checksum-mismatch");
        assert_eq!(Stage::Extract.as_str(), "extract");
        assert_eq!(Stage::Install.as_str(), "install");
    }

    #[test]
    fn test_download_stage_follows_artifact() {
        assert_eq!(download(Artifact::Binary, None).stage(), Stage::DownloadBinary);
        assert_eq!(
            download(Artifact::Checksum, None).stage(),
            Stage::DownloadChecksum
        );
    }

    #[test]
    fn test_download_error_category() {
        assert_eq!(
            download(Artifact::Binary, Some(503)).category(),
            ErrorCategory::Network
        );
        assert!(download(Artifact::Binary, None).is_retryable());
        // A 404 means the version or template is wrong, not the network.
        assert_eq!(
            download(Artifact::Binary, Some(404)).category(),
            ErrorCategory::Config
        );
        assert_eq!(
            download(Artifact::Binary, Some(429)).category(),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = Error::ChecksumMismatch {
            component: "runc".to_string(),
            file: "runc.amd64".to_string(),
            expected: None,
            actual: "abc".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("runc.amd64"));
        assert!(display.contains("no manifest entry"));
        assert_eq!(err.stage(), Stage::Verify);
        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_install_permission_category() {
        let err = Error::InstallIoFailed {
            component: "kubelet".to_string(),
            path: PathBuf::from("/usr/local/bin/kubelet"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.stage(), Stage::Install);
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_io_other_category() {
        let err = Error::io("/tmp", io::Error::new(io::ErrorKind::StorageFull, "full"));
        assert_eq!(err.stage(), Stage::Prepare);
        assert_eq!(err.category(), ErrorCategory::Other);
    }

    #[test]
    fn test_cancelled_keeps_stage() {
        let err = Error::Cancelled {
            component: "etcd".to_string(),
            stage: Stage::Extract,
        };
        assert_eq!(err.stage(), Stage::Extract);
        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert!(err.to_string().contains("extract"));
    }

    #[test]
    fn test_category_advice_not_empty() {
        for category in [
            ErrorCategory::Network,
            ErrorCategory::Integrity,
            ErrorCategory::Format,
            ErrorCategory::Permission,
            ErrorCategory::Config,
            ErrorCategory::Cancelled,
            ErrorCategory::Other,
        ] {
            assert!(!category.advice().is_empty());
            assert!(!category.description().is_empty());
        }
    }
}
