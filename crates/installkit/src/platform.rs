//! Platform detection for binary downloads.
//!
//! Kubernetes-ecosystem release artifacts are named with Go's `GOOS`/`GOARCH`
//! vocabulary (`linux`, `amd64`, `arm64`), not with Rust target triples, so
//! this module maps the running platform onto those names.
//!
//! # Example
//!
//! ```
//! use installkit::platform;
//!
//! let platform = platform::detect().expect("unsupported platform");
//! println!("Downloading for: {}", platform);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target platform for artifact downloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system in Go naming (e.g., "linux", "darwin").
    pub os: String,
    /// CPU architecture in Go naming (e.g., "amd64", "arm64").
    pub arch: String,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// A Linux platform with the given architecture.
    ///
    /// Rust-style aliases (`x86_64`, `aarch64`) are accepted and normalized.
    #[must_use]
    pub fn linux(arch: &str) -> Self {
        Self::new("linux", normalize_arch(arch))
    }

    /// Replace the architecture, normalizing aliases.
    #[must_use]
    pub fn with_arch(mut self, arch: &str) -> Self {
        self.arch = normalize_arch(arch).to_string();
        self
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Detect the current platform.
///
/// # Supported Platforms
///
/// | Rust arch   | Go arch  |
/// |-------------|----------|
/// | x86_64      | amd64    |
/// | aarch64     | arm64    |
/// | arm         | arm      |
/// | powerpc64   | ppc64le  |
/// | s390x       | s390x    |
/// | riscv64     | riscv64  |
///
/// # Errors
///
/// Returns `Error::UnsupportedPlatform` for other operating systems or
/// architectures.
pub fn detect() -> Result<Platform> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;

    let go_os = match os {
        "linux" => "linux",
        "macos" => "darwin",
        _ => return Err(unsupported(os, arch)),
    };

    let go_arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "arm",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        _ => return Err(unsupported(os, arch)),
    };

    Ok(Platform::new(go_os, go_arch))
}

/// Map Rust-style architecture names to Go naming; other names pass through.
#[must_use]
pub fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" | "x86-64" | "x64" => "amd64",
        "aarch64" | "armv8" => "arm64",
        "powerpc64le" => "ppc64le",
        other => other,
    }
}

fn unsupported(os: &str, arch: &str) -> Error {
    Error::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    }
}
