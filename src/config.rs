//! Component configuration file.
//!
//! The file is optional: without it every built-in component is installed at
//! its built-in version. Entries under `[components.<name>]` override
//! individual fields of the built-in entry with the same name, or define a
//! new component when every field is given.

use anyhow::{Context, Result, bail};
use installkit::{ArchiveKind, ChecksumRule, ComponentSpec, VersionProbe, catalog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nodestrap/components.toml";

const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_JOBS: usize = 4;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentOverride>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Target architecture; detected when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Parent of scratch directories; system temp dir when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_download_timeout() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_jobs() -> usize {
    DEFAULT_JOBS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            arch: None,
            scratch_dir: None,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            jobs: DEFAULT_JOBS,
        }
    }
}

impl Settings {
    /// Scratch directory with `~` and environment variables expanded.
    pub fn scratch_path(&self) -> Result<Option<PathBuf>> {
        self.scratch_dir
            .as_deref()
            .map(|dir| {
                shellexpand::full(dir)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .with_context(|| format!("Cannot expand scratch_dir '{dir}'"))
            })
            .transpose()
    }
}

/// One `[components.<name>]` entry. Every field is optional so that an
/// entry can override a single field of a built-in component.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<VersionProbe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl From<&ComponentSpec> for ComponentOverride {
    /// Every field set from `spec`.
    fn from(spec: &ComponentSpec) -> Self {
        Self {
            version: Some(spec.version.clone()),
            repository: Some(spec.repository.clone()),
            binary_url: Some(spec.binary_url.clone()),
            checksum_url: Some(spec.checksum_url.clone()),
            install_path: Some(spec.install_path.clone()),
            archive: Some(spec.archive.clone()),
            checksum: Some(spec.checksum),
            probe: Some(spec.probe.clone()),
            enabled: Some(true),
        }
    }
}

impl ComponentOverride {
    /// Apply the set fields on top of `spec`.
    fn apply(&self, mut spec: ComponentSpec) -> ComponentSpec {
        if let Some(version) = &self.version {
            spec.version.clone_from(version);
        }
        if let Some(repository) = &self.repository {
            spec.repository.clone_from(repository);
        }
        if let Some(url) = &self.binary_url {
            spec.binary_url.clone_from(url);
        }
        if let Some(url) = &self.checksum_url {
            spec.checksum_url.clone_from(url);
        }
        if let Some(path) = &self.install_path {
            spec.install_path.clone_from(path);
        }
        if let Some(archive) = &self.archive {
            spec.archive = archive.clone();
        }
        if let Some(checksum) = self.checksum {
            spec.checksum = checksum;
        }
        if let Some(probe) = &self.probe {
            spec.probe = probe.clone();
        }
        spec
    }

    /// Build a spec for a component that has no built-in entry.
    fn build(&self, name: &str) -> Result<ComponentSpec> {
        fn required<T: Clone>(name: &str, field: &str, value: Option<&T>) -> Result<T> {
            value.cloned().with_context(|| {
                format!("Component '{name}' is not built in and must set '{field}'")
            })
        }

        Ok(ComponentSpec {
            name: name.to_string(),
            version: required(name, "version", self.version.as_ref())?,
            repository: self.repository.clone().unwrap_or_default(),
            binary_url: required(name, "binary_url", self.binary_url.as_ref())?,
            checksum_url: required(name, "checksum_url", self.checksum_url.as_ref())?,
            install_path: required(name, "install_path", self.install_path.as_ref())?,
            archive: self.archive.clone().unwrap_or(ArchiveKind::RawBinary),
            checksum: required(name, "checksum", self.checksum.as_ref())?,
            probe: self.probe.clone().unwrap_or_else(VersionProbe::last_field),
        })
    }
}

/// A component as configured.
#[derive(Debug, Clone)]
pub struct Component {
    pub spec: ComponentSpec,
    pub enabled: bool,
    pub builtin: bool,
}

impl Config {
    /// Load the configuration at `path`.
    ///
    /// A missing file yields the built-in defaults unless `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() {
            if required {
                bail!("Config file {} does not exist", path.display());
            }
            log::debug!("{} not found, using built-in components", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.settings.jobs == 0 {
            bail!("settings.jobs must be at least 1");
        }
        Ok(config)
    }

    /// The built-in table written out in full, for `config init`.
    pub fn builtin() -> Self {
        Self {
            settings: Settings::default(),
            components: catalog::builtin()
                .iter()
                .map(|spec| (spec.name.clone(), ComponentOverride::from(spec)))
                .collect(),
        }
    }

    /// Serialize as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Effective component table: built-ins in install order, then
    /// components only defined in the file, by name.
    pub fn components(&self) -> Result<Vec<Component>> {
        let mut components = Vec::new();

        for spec in catalog::builtin() {
            let entry = self.components.get(&spec.name);
            components.push(Component {
                enabled: entry.and_then(|e| e.enabled).unwrap_or(true),
                spec: match entry {
                    Some(entry) => entry.apply(spec),
                    None => spec,
                },
                builtin: true,
            });
        }

        for (name, entry) in &self.components {
            if catalog::NAMES.contains(&name.as_str()) {
                continue;
            }
            components.push(Component {
                spec: entry.build(name)?,
                enabled: entry.enabled.unwrap_or(true),
                builtin: false,
            });
        }

        Ok(components)
    }

    /// Components selected by name, or every enabled one when `names` is
    /// empty. Names are kept in command-line order.
    pub fn select(&self, names: &[String]) -> Result<Vec<Component>> {
        let components = self.components()?;
        if names.is_empty() {
            return Ok(components.into_iter().filter(|c| c.enabled).collect());
        }

        names
            .iter()
            .map(|name| {
                components
                    .iter()
                    .find(|c| &c.spec.name == name)
                    .cloned()
                    .with_context(|| {
                        let known: Vec<_> = components.iter().map(|c| c.spec.name.as_str()).collect();
                        format!("Unknown component '{name}' (known: {})", known.join(", "))
                    })
            })
            .collect()
    }

    /// Validate every component; returns one message per problem.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut problems = Vec::new();
        for component in self.components()? {
            if let Err(e) = component.spec.validate() {
                problems.push(e.to_string());
            }
        }
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use installkit::ManifestFormat;

    #[test]
    fn test_empty_config_uses_builtins() {
        let config = Config::parse("").unwrap();
        let components = config.components().unwrap();
        let names: Vec<_> = components.iter().map(|c| c.spec.name.as_str()).collect();
        assert_eq!(names, catalog::NAMES);
        assert!(components.iter().all(|c| c.enabled && c.builtin));
        assert_eq!(config.settings.jobs, DEFAULT_JOBS);
        assert_eq!(config.settings.download_timeout_secs, 300);
    }

    #[test]
    fn test_version_override_keeps_other_fields() {
        let config = Config::parse(
            r#"
            [components.containerd]
            version = "v1.7.20"
            "#,
        )
        .unwrap();
        let containerd = config.select(&["containerd".to_string()]).unwrap().remove(0);
        assert_eq!(containerd.spec.normalized_version(), "1.7.20");
        assert_eq!(
            containerd.spec.archive,
            catalog::get("containerd").unwrap().archive
        );
    }

    #[test]
    fn test_disabled_component_is_not_selected_by_default() {
        let config = Config::parse(
            r#"
            [components.etcd]
            enabled = false
            "#,
        )
        .unwrap();
        let selected = config.select(&[]).unwrap();
        assert!(selected.iter().all(|c| c.spec.name != "etcd"));
        assert_eq!(selected.len(), catalog::NAMES.len() - 1);

        // Naming it explicitly still selects it.
        assert_eq!(config.select(&["etcd".to_string()]).unwrap().len(), 1);
    }

    #[test]
    fn test_new_component_definition() {
        let config = Config::parse(
            r#"
            [settings]
            arch = "arm64"
            jobs = 2

            [components.helm]
            version = "3.15.2"
            repository = "https://get.helm.sh"
            binary_url = "{repo}/helm-{tag}-{os}-{arch}.tar.gz"
            checksum_url = "{repo}/helm-{tag}-{os}-{arch}.tar.gz.sha256sum"
            install_path = "/usr/local/bin"
            archive = { kind = "tar-gz", members = ["{os}-{arch}/helm"] }
            checksum = { format = "multi-file" }
            probe = { kind = "log-grep-pattern", args = ["version"], pattern = 'Version:"v?([^"]+)"' }
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.arch.as_deref(), Some("arm64"));

        let helm = config.select(&["helm".to_string()]).unwrap().remove(0);
        assert!(!helm.builtin);
        assert_eq!(helm.spec.checksum.format, ManifestFormat::MultiFile);
        helm.spec.validate().unwrap();
    }

    #[test]
    fn test_incomplete_new_component() {
        let config = Config::parse(
            r#"
            [components.helm]
            version = "3.15.2"
            "#,
        )
        .unwrap();
        let err = config.components().unwrap_err();
        assert!(err.to_string().contains("binary_url"));
    }

    #[test]
    fn test_unknown_component_selected() {
        let config = Config::default();
        let err = config.select(&["docker".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Unknown component 'docker'"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(Config::parse("[settings]\nparallel = 3\n").is_err());
        assert!(Config::parse("[components.runc]\nsha = \"x\"\n").is_err());
        assert!(Config::parse("[settings]\njobs = 0\n").is_err());
    }

    #[test]
    fn test_builtin_table_round_trips() {
        let text = Config::builtin().to_toml().unwrap();
        let parsed = Config::parse(&text).unwrap();
        let specs: Vec<_> = parsed
            .components()
            .unwrap()
            .into_iter()
            .map(|c| c.spec)
            .collect();
        assert_eq!(specs, catalog::builtin());
    }

    #[test]
    fn test_validate_reports_bad_component() {
        let config = Config::parse(
            r#"
            [components.kubelet]
            install_path = "usr/local/bin/kubelet"
            "#,
        )
        .unwrap();
        let problems = config.validate().unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("kubelet"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components.toml");
        assert!(Config::load(&path, false).unwrap().components.is_empty());
        assert!(Config::load(&path, true).is_err());
    }

    #[test]
    fn test_scratch_path_expands_env() {
        let home = std::env::var("HOME").unwrap();
        let settings = Settings {
            scratch_dir: Some("$HOME/.cache/nodestrap".to_string()),
            ..Settings::default()
        };
        assert_eq!(
            settings.scratch_path().unwrap(),
            Some(PathBuf::from(format!("{home}/.cache/nodestrap")))
        );
    }

    #[test]
    fn test_scratch_path_plain_and_unset() {
        let settings = Settings {
            scratch_dir: Some("/var/tmp/nodestrap".to_string()),
            ..Settings::default()
        };
        assert_eq!(
            settings.scratch_path().unwrap(),
            Some(PathBuf::from("/var/tmp/nodestrap"))
        );
        assert_eq!(Settings::default().scratch_path().unwrap(), None);
    }

    #[test]
    fn test_undefined_variable_in_scratch_dir_is_an_error() {
        let settings = Settings {
            scratch_dir: Some("$NODESTRAP_UNSET_FOR_TEST/scratch".to_string()),
            ..Settings::default()
        };
        assert!(settings.scratch_path().is_err());
    }
}
