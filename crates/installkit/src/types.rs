//! Core types for component installation.
//!
//! A [`ComponentSpec`] describes how to probe, fetch, verify and install one
//! tool. An [`InstallOutcome`] is what one run produced; it is reported and
//! discarded, nothing is persisted.

use crate::archive;
use crate::checksum::ChecksumRule;
use crate::error::{Error, Result, Stage};
use crate::platform::Platform;
use crate::probe::VersionProbe;
use crate::version;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Placeholders accepted in URL and member templates.
pub const PLACEHOLDERS: &[&str] = &["repo", "version", "tag", "arch", "os"];

/// How the downloaded artifact becomes installed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ArchiveKind {
    /// The download is the binary; `install_path` is the destination file.
    #[serde(rename = "raw")]
    RawBinary,

    /// The download is a gzip-compressed tarball; the listed members are
    /// installed into the `install_path` directory under their base names.
    /// The first member is the binary that gets probed for its version.
    TarGz {
        /// Member paths inside the archive (templated like URLs).
        members: Vec<String>,
    },
}

impl ArchiveKind {
    /// Short label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::RawBinary => "raw",
            Self::TarGz { .. } => "tar.gz",
        }
    }
}

/// Static description of one installable component.
///
/// # Templates
///
/// `binary_url`, `checksum_url` and tar.gz members may use:
///
/// | Placeholder | Value                                   |
/// |-------------|-----------------------------------------|
/// | `{repo}`    | `repository`                            |
/// | `{version}` | target version without leading `v`      |
/// | `{tag}`     | target version with leading `v`         |
/// | `{arch}`    | Go architecture (`amd64`, `arm64`, ...) |
/// | `{os}`      | Go operating system (`linux`)           |
///
/// # Example
///
/// ```
/// use installkit::{ArchiveKind, ChecksumRule, ComponentSpec, Platform, VersionProbe};
///
/// let spec = ComponentSpec {
///     name: "runc".to_string(),
///     version: "v1.1.12".to_string(),
///     repository: "https://github.com/opencontainers/runc/releases/download".to_string(),
///     binary_url: "{repo}/{tag}/runc.{arch}".to_string(),
///     checksum_url: "{repo}/{tag}/runc.sha256sum".to_string(),
///     install_path: "/usr/local/sbin/runc".into(),
///     probe: VersionProbe::last_field(),
///     archive: ArchiveKind::RawBinary,
///     checksum: ChecksumRule::multi_file(),
/// };
///
/// let platform = Platform::linux("amd64");
/// assert_eq!(
///     spec.binary_url(&platform),
///     "https://github.com/opencontainers/runc/releases/download/v1.1.12/runc.amd64"
/// );
/// assert_eq!(spec.binary_file_name(&platform), "runc.amd64");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component identifier (e.g. "containerd"); also the log tag.
    pub name: String,
    /// Target version, with or without a leading `v`.
    pub version: String,
    /// Base URL substituted for `{repo}`.
    pub repository: String,
    /// Template for the binary or archive URL.
    pub binary_url: String,
    /// Template for the checksum manifest URL.
    pub checksum_url: String,
    /// Destination file (raw) or directory (tar.gz).
    pub install_path: PathBuf,
    /// How to ask the installed binary for its version.
    pub probe: VersionProbe,
    /// How the artifact is unpacked.
    pub archive: ArchiveKind,
    /// How the checksum manifest is read.
    pub checksum: ChecksumRule,
}

impl ComponentSpec {
    /// Target version without a leading `v`.
    #[must_use]
    pub fn normalized_version(&self) -> &str {
        version::normalize(&self.version)
    }

    /// Substitute placeholders in `template`.
    ///
    /// Unknown placeholders are left untouched; [`ComponentSpec::validate`]
    /// rejects them.
    #[must_use]
    pub fn render(&self, template: &str, platform: &Platform) -> String {
        let mut out = String::with_capacity(template.len() + 64);
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let key = &after[..end];
            match key {
                "repo" => out.push_str(self.repository.trim_end_matches('/')),
                "version" => out.push_str(self.normalized_version()),
                "tag" => out.push_str(&version::tag(&self.version)),
                "arch" => out.push_str(&platform.arch),
                "os" => out.push_str(&platform.os),
                _ => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }

    /// Resolved URL of the binary artifact.
    #[must_use]
    pub fn binary_url(&self, platform: &Platform) -> String {
        self.render(&self.binary_url, platform)
    }

    /// Resolved URL of the checksum manifest.
    #[must_use]
    pub fn checksum_url(&self, platform: &Platform) -> String {
        self.render(&self.checksum_url, platform)
    }

    /// File name of the downloaded artifact: the last path segment of the
    /// binary URL. Multi-file manifests are searched for this name.
    #[must_use]
    pub fn binary_file_name(&self, platform: &Platform) -> String {
        let url = self.binary_url(platform);
        let path = url.split(['?', '#']).next().unwrap_or(url.as_str());
        path.rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(self.name.as_str())
            .to_string()
    }

    /// Resolved archive members (empty for raw binaries).
    #[must_use]
    pub fn archive_members(&self, platform: &Platform) -> Vec<String> {
        match &self.archive {
            ArchiveKind::RawBinary => Vec::new(),
            ArchiveKind::TarGz { members } => {
                members.iter().map(|m| self.render(m, platform)).collect()
            }
        }
    }

    /// Every path this component installs, in member order.
    #[must_use]
    pub fn install_targets(&self, platform: &Platform) -> Vec<PathBuf> {
        match &self.archive {
            ArchiveKind::RawBinary => vec![self.install_path.clone()],
            ArchiveKind::TarGz { .. } => self
                .archive_members(platform)
                .iter()
                .map(|m| self.install_path.join(base_name(m)))
                .collect(),
        }
    }

    /// The binary whose version is probed.
    #[must_use]
    pub fn probe_target(&self, platform: &Platform) -> PathBuf {
        self.install_targets(platform)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.install_path.clone())
    }

    /// Check the specification for mistakes that would only surface
    /// halfway through an install.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSpec` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Error::invalid_spec(&self.name, message);

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if self.normalized_version().is_empty() {
            return Err(invalid("version is empty".to_string()));
        }
        if !self.install_path.is_absolute() {
            return Err(invalid(format!(
                "install path {} is not absolute",
                self.install_path.display()
            )));
        }

        check_template("binary_url", &self.binary_url).map_err(&invalid)?;
        check_template("checksum_url", &self.checksum_url).map_err(&invalid)?;

        if let ArchiveKind::TarGz { members } = &self.archive {
            if members.is_empty() {
                return Err(invalid("tar.gz archive lists no members".to_string()));
            }
            let mut seen = HashSet::new();
            for member in members {
                check_template("member", member).map_err(&invalid)?;
                if !archive::is_safe_member(member) {
                    return Err(invalid(format!("member '{member}' must be a relative path")));
                }
                // Members land in one directory under their base names.
                if !seen.insert(base_name(member)) {
                    return Err(invalid(format!(
                        "member '{member}' would be installed as '{}' more than once",
                        base_name(member)
                    )));
                }
            }
        }

        self.probe.validate().map_err(&invalid)?;
        Ok(())
    }
}

fn base_name(member: &str) -> &str {
    member
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(member)
}

fn check_template(field: &str, template: &str) -> std::result::Result<(), String> {
    if template.trim().is_empty() {
        return Err(format!("{field} is empty"));
    }
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("{field} has an unclosed placeholder"))?;
        let key = &after[..end];
        if !PLACEHOLDERS.contains(&key) {
            return Err(format!("{field} uses unknown placeholder {{{key}}}"));
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

/// Result of one `ensure_installed` run.
#[derive(Debug)]
pub enum InstallOutcome {
    /// The installed version already matched the target; nothing was fetched.
    Skipped {
        /// The installed (normalized) version.
        version: String,
    },

    /// A fresh copy was installed.
    Installed {
        /// Version found before the run (`"none"` when absent).
        previous: String,
        /// Version that was installed (normalized).
        installed: String,
        /// Files written.
        paths: Vec<PathBuf>,
    },

    /// The run stopped at `stage`; the install path was left as it was.
    Failed {
        /// Stage that failed.
        stage: Stage,
        /// What went wrong.
        error: Error,
    },
}

impl InstallOutcome {
    /// Whether the run failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the run changed the filesystem.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }

    /// Outcome label used in log records.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Installed { .. } => "installed",
            Self::Failed { .. } => "failed",
        }
    }

    /// The error, when the run failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { version } => write!(f, "{version} already installed"),
            Self::Installed {
                previous,
                installed,
                ..
            } => {
                if previous == version::NONE {
                    write!(f, "{installed} installed")
                } else {
                    write!(f, "upgraded from {previous} to {installed}")
                }
            }
            Self::Failed { stage, error } => write!(f, "failed at {stage}: {error}"),
        }
    }
}

/// Counts over a set of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    /// Components that were installed.
    pub installed: usize,
    /// Components already at their target version.
    pub skipped: usize,
    /// Components that failed.
    pub failed: usize,
}

impl Report {
    /// Tally a sequence of outcomes.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a InstallOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                InstallOutcome::Skipped { .. } => report.skipped += 1,
                InstallOutcome::Installed { .. } => report.installed += 1,
                InstallOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report
    }

    /// Whether no component failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} installed, {} up to date, {} failed",
            self.installed, self.skipped, self.failed
        )
    }
}
