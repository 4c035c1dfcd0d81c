//! # installkit
//!
//! Idempotent, versioned installation of the binaries a Kubernetes node
//! needs (runc, containerd, kubelet, kubeadm, kubectl, etcd, crictl).
//!
//! Every component goes through the same steps:
//!
//! 1. Probe the installed binary for its version.
//! 2. Compare with the target after normalization; stop if they match.
//! 3. Download the artifact and its checksum manifest into a private
//!    scratch directory.
//! 4. Verify the artifact against the manifest entry for its file name.
//! 5. Extract the named members when the artifact is a tarball.
//! 6. Stage every executable next to its install path, then rename them all
//!    into place; if one rename fails the others are rolled back.
//! 7. Remove the scratch directory, whatever happened.
//!
//! A failure at any step leaves the install path exactly as it was.
//!
//! ## Example
//!
//! ```no_run
//! use installkit::{catalog, Installer, InstallerOptions, platform};
//!
//! let options = InstallerOptions::new(platform::detect().unwrap());
//! let installer = Installer::new(options);
//!
//! let runc = catalog::get("runc").unwrap();
//! let outcome = installer.ensure_installed(&runc);
//! println!("runc: {outcome}");
//! ```
//!
//! ## Testing
//!
//! [`Installer::with_backend`] accepts any [`Backend`]; the in-memory
//! [`MockBackend`] serves fixture artifacts without network access.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod backend;
pub mod cancel;
pub mod catalog;
pub mod checksum;
pub mod error;
pub mod install;
pub mod platform;
pub mod probe;
pub mod types;
pub mod unit;
pub mod version;

pub use cancel::CancelToken;
pub use checksum::{ChecksumRule, DigestAlgorithm, ManifestFormat};
pub use error::{Artifact, Error, ErrorCategory, Result, Stage};
pub use platform::Platform;
pub use probe::{ProbeResult, VersionProbe};
pub use types::{ArchiveKind, ComponentSpec, InstallOutcome, Report};

pub use backend::Backend;
pub use backend::MockBackend;
use backend::FetchError;
use backend::http::HttpBackend;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Settings shared by every install an [`Installer`] performs.
#[derive(Debug, Clone)]
pub struct InstallerOptions {
    /// Platform used to render URLs and archive members.
    pub platform: Platform,
    /// Parent of the per-run scratch directories (system temp dir when
    /// unset).
    pub scratch_dir: Option<PathBuf>,
    /// Cancellation flag checked before every stage.
    pub cancel: CancelToken,
}

impl InstallerOptions {
    /// Options for `platform` with the system temp dir and a fresh token.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            scratch_dir: None,
            cancel: CancelToken::new(),
        }
    }

    /// Use `dir` as the parent of scratch directories.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Share `cancel` with the installer.
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Installed and target versions of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    /// Component name.
    pub name: String,
    /// Installed version (normalized), or `"none"`.
    pub current: String,
    /// Target version (normalized).
    pub target: String,
    /// Whether `ensure_installed` would skip the component.
    pub up_to_date: bool,
}

/// High-level client that ensures components are installed.
///
/// # Example
///
/// ```no_run
/// use installkit::{catalog, Installer, InstallerOptions, Platform};
///
/// let installer = Installer::new(InstallerOptions::new(Platform::linux("amd64")));
/// let outcomes = installer.ensure_all(&catalog::builtin(), 4);
/// for (name, outcome) in &outcomes {
///     println!("{name}: {outcome}");
/// }
/// ```
pub struct Installer {
    backend: Box<dyn Backend>,
    options: InstallerOptions,
}

impl Installer {
    /// Create an installer that downloads over HTTPS with default deadlines.
    #[must_use]
    pub fn new(options: InstallerOptions) -> Self {
        Self::with_backend(Box::new(HttpBackend::new()), options)
    }

    /// Create an installer with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>, options: InstallerOptions) -> Self {
        Self { backend, options }
    }

    /// Platform the installer renders URLs for.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.options.platform
    }

    // =========================================================================
    // Probing
    // =========================================================================

    /// Installed version of `spec` (normalized), or `"none"` when the probe
    /// is inconclusive.
    pub fn current_version(&self, spec: &ComponentSpec) -> String {
        let binary = spec.probe_target(&self.options.platform);
        match spec.probe.run(&binary) {
            ProbeResult::Found(raw) => version::normalize(&raw).to_string(),
            ProbeResult::Inconclusive(reason) => {
                log::debug!(target: spec.name.as_str(), "version probe inconclusive: {reason}");
                version::NONE.to_string()
            }
        }
    }

    /// Compare the installed version with the target without installing.
    pub fn status(&self, spec: &ComponentSpec) -> ComponentStatus {
        let current = self.current_version(spec);
        let target = spec.normalized_version().to_string();
        ComponentStatus {
            name: spec.name.clone(),
            up_to_date: version::same_version(&current, &target),
            current,
            target,
        }
    }

    // =========================================================================
    // Installation
    // =========================================================================

    /// Ensure the target version of `spec` is installed.
    ///
    /// Never panics and never returns early with an error: every problem is
    /// reported as [`InstallOutcome::Failed`] naming the stage it happened
    /// in. One structured log record is emitted per call with the component
    /// name as target.
    pub fn ensure_installed(&self, spec: &ComponentSpec) -> InstallOutcome {
        if let Err(error) = spec.validate() {
            let outcome = InstallOutcome::Failed {
                stage: Stage::Prepare,
                error,
            };
            record(spec, version::NONE, &outcome);
            return outcome;
        }

        let current = self.current_version(spec);
        let target = spec.normalized_version();

        let outcome = if version::same_version(&current, target) {
            InstallOutcome::Skipped {
                version: current.clone(),
            }
        } else {
            log::debug!(
                target: spec.name.as_str(),
                "installed version {current} differs from target {target}"
            );
            let mut stage = Stage::Prepare;
            match self.install(spec, &mut stage) {
                Ok(paths) => InstallOutcome::Installed {
                    previous: current.clone(),
                    installed: target.to_string(),
                    paths,
                },
                Err(error) => InstallOutcome::Failed { stage, error },
            }
        };

        record(spec, &current, &outcome);
        outcome
    }

    /// Ensure every spec is installed, running up to `jobs` at once.
    ///
    /// Components are independent: one failure does not stop the others.
    /// Results are returned in the order of `specs`.
    pub fn ensure_all(&self, specs: &[ComponentSpec], jobs: usize) -> Vec<(String, InstallOutcome)> {
        let run = |spec: &ComponentSpec| (spec.name.clone(), self.ensure_installed(spec));

        if jobs <= 1 || specs.len() <= 1 {
            return specs.iter().map(run).collect();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(|| specs.par_iter().map(run).collect()),
            Err(e) => {
                log::warn!("cannot start {jobs} workers ({e}), installing sequentially");
                specs.iter().map(run).collect()
            }
        }
    }

    fn install(&self, spec: &ComponentSpec, stage: &mut Stage) -> Result<Vec<PathBuf>> {
        let name = spec.name.as_str();
        let platform = &self.options.platform;

        self.checkpoint(name, *stage)?;
        let scratch = self.scratch(name)?;

        *stage = Stage::DownloadBinary;
        let file_name = spec.binary_file_name(platform);
        let artifact = scratch.path().join(&file_name);
        self.fetch(spec, Artifact::Binary, &spec.binary_url(platform), &artifact)?;

        *stage = Stage::DownloadChecksum;
        let manifest_path = scratch.path().join(format!("{file_name}.manifest"));
        self.fetch(spec, Artifact::Checksum, &spec.checksum_url(platform), &manifest_path)?;

        *stage = Stage::Verify;
        self.checkpoint(name, *stage)?;
        let manifest =
            fs::read_to_string(&manifest_path).map_err(|e| Error::io(&manifest_path, e))?;
        checksum::verify(name, &spec.checksum, &artifact, &file_name, &manifest)?;

        *stage = Stage::Extract;
        self.checkpoint(name, *stage)?;
        let sources = match &spec.archive {
            ArchiveKind::RawBinary => vec![artifact],
            ArchiveKind::TarGz { .. } => archive::extract_members(
                name,
                &artifact,
                &scratch.path().join("extract"),
                &spec.archive_members(platform),
            )?,
        };

        *stage = Stage::Install;
        self.checkpoint(name, *stage)?;
        let targets = spec.install_targets(platform);
        let files: Vec<_> = sources.into_iter().zip(targets.iter().cloned()).collect();
        install::install_executables(name, &files)?;
        for dest in &targets {
            log::debug!(target: name, "installed {}", dest.display());
        }

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            log::warn!(target: name, "cannot remove scratch {}: {e}", scratch_path.display());
        }

        Ok(targets)
    }

    /// Private scratch directory, removed when the returned guard drops.
    fn scratch(&self, name: &str) -> Result<TempDir> {
        let root = self
            .options
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("nodestrap-{name}-"))
            .tempdir_in(&root)
            .map_err(|e| Error::io(&root, e))?;
        log::debug!(target: name, "scratch directory {}", dir.path().display());
        Ok(dir)
    }

    fn fetch(
        &self,
        spec: &ComponentSpec,
        artifact: Artifact,
        url: &str,
        dest: &Path,
    ) -> Result<()> {
        let name = spec.name.as_str();
        self.checkpoint(name, artifact.stage())?;
        log::debug!(target: name, "downloading {artifact} from {url}");

        match self.backend.download(url, dest, &self.options.cancel) {
            Ok(size) => {
                log::debug!(target: name, "downloaded {artifact} ({size} bytes)");
                Ok(())
            }
            Err(FetchError::Cancelled) => Err(Error::Cancelled {
                component: name.to_string(),
                stage: artifact.stage(),
            }),
            Err(e) => Err(Error::DownloadFailed {
                component: name.to_string(),
                artifact,
                status: e.status(),
                message: format!("{url}: {e}"),
            }),
        }
    }

    fn checkpoint(&self, name: &str, stage: Stage) -> Result<()> {
        if self.options.cancel.is_cancelled() {
            Err(Error::Cancelled {
                component: name.to_string(),
                stage,
            })
        } else {
            Ok(())
        }
    }
}

/// Emit the per-run structured record.
fn record(spec: &ComponentSpec, current: &str, outcome: &InstallOutcome) {
    let name = spec.name.as_str();
    let target = spec.normalized_version();
    match outcome {
        InstallOutcome::Failed { stage, error } => log::error!(
            target: name,
            "component={name} outcome=failed old={current} new={target} stage={stage} error=\"{error}\""
        ),
        _ => log::info!(
            target: name,
            "component={name} outcome={} old={current} new={target}",
            outcome.label()
        ),
    }
}
