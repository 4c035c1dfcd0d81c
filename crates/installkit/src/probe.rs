//! Asking an installed binary for its version.
//!
//! Each tool reports its version differently:
//!
//! | Tool       | Command                     | Output                                        |
//! |------------|-----------------------------|-----------------------------------------------|
//! | runc       | `runc --version`            | `runc version 1.1.12` (first line)            |
//! | kubelet    | `kubelet --version`         | `Kubernetes v1.30.2`                          |
//! | kubectl    | `kubectl version -o json`   | `{"clientVersion":{"gitVersion":"v1.30.2"}}`  |
//! | containerd | `containerd --version`      | `containerd github.com/... v1.7.19 <commit>`  |
//!
//! [`VersionProbe`] models that variation as data. A probe that cannot
//! produce a version is *inconclusive*, never an error: a missing binary is
//! the normal first-run state.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

/// How many times to retry spawning a binary that is still busy.
const BUSY_RETRIES: u32 = 10;

/// Delay between busy retries.
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// How to extract a version string from a binary's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VersionProbe {
    /// Last whitespace-separated field of the first line, or of the first
    /// line starting with `line_prefix`.
    PlainTextLastField {
        /// Arguments passed to the binary.
        #[serde(default = "default_args")]
        args: Vec<String>,
        /// Select the first line starting with this text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_prefix: Option<String>,
    },

    /// A string field in JSON output, addressed by a dot-separated path.
    JsonFieldPath {
        /// Arguments passed to the binary.
        args: Vec<String>,
        /// Path such as `clientVersion.gitVersion`.
        path: String,
    },

    /// First match of a regular expression over stdout and stderr. Capture
    /// group 1 is the version when present, otherwise the whole match.
    LogGrepPattern {
        /// Arguments passed to the binary.
        #[serde(default = "default_args")]
        args: Vec<String>,
        /// Regular expression.
        pattern: String,
    },
}

fn default_args() -> Vec<String> {
    vec!["--version".to_string()]
}

/// Outcome of running a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The version reported by the binary, as printed.
    Found(String),
    /// No version could be determined; the reason is for debug logs.
    Inconclusive(String),
}

impl ProbeResult {
    /// The found version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Found(version) => Some(version),
            Self::Inconclusive(_) => None,
        }
    }
}

impl VersionProbe {
    /// `<binary> --version`, last field of the first line.
    #[must_use]
    pub fn last_field() -> Self {
        Self::PlainTextLastField {
            args: default_args(),
            line_prefix: None,
        }
    }

    /// Arguments passed to the binary.
    #[must_use]
    pub fn args(&self) -> &[String] {
        match self {
            Self::PlainTextLastField { args, .. }
            | Self::JsonFieldPath { args, .. }
            | Self::LogGrepPattern { args, .. } => args,
        }
    }

    /// Check that the probe is usable (the pattern compiles, the path is
    /// not empty).
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::PlainTextLastField { .. } => Ok(()),
            Self::JsonFieldPath { path, .. } => {
                if path.split('.').any(str::is_empty) {
                    Err(format!("invalid JSON field path '{path}'"))
                } else {
                    Ok(())
                }
            }
            Self::LogGrepPattern { pattern, .. } => regex::Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| format!("invalid version pattern: {e}")),
        }
    }

    /// Extract a version from raw command output.
    #[must_use]
    pub fn extract(&self, raw: &str) -> Option<String> {
        let version = match self {
            Self::PlainTextLastField { line_prefix, .. } => {
                let mut lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());
                let line = match line_prefix {
                    Some(prefix) => lines.find(|l| l.starts_with(prefix.as_str()))?,
                    None => lines.next()?,
                };
                line.split_whitespace().last()?.to_string()
            }
            Self::JsonFieldPath { path, .. } => {
                let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
                path.split('.')
                    .try_fold(&value, |node, key| node.get(key))?
                    .as_str()?
                    .to_string()
            }
            Self::LogGrepPattern { pattern, .. } => {
                let re = regex::Regex::new(pattern).ok()?;
                let caps = re.captures(raw)?;
                caps.get(1).or_else(|| caps.get(0))?.as_str().to_string()
            }
        };

        let version = version.trim().to_string();
        if version.is_empty() {
            None
        } else {
            Some(version)
        }
    }

    /// Run the probe against `binary`.
    pub fn run(&self, binary: &Path) -> ProbeResult {
        if !binary.is_file() {
            return ProbeResult::Inconclusive(format!("{} not found", binary.display()));
        }

        let output = match spawn(binary, self.args()) {
            Ok(output) => output,
            Err(e) => {
                return ProbeResult::Inconclusive(format!(
                    "failed to execute {}: {}",
                    binary.display(),
                    e
                ));
            }
        };

        if !output.status.success() {
            return ProbeResult::Inconclusive(format!(
                "{} exited with {}",
                binary.display(),
                output.status
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let raw = match self {
            Self::LogGrepPattern { .. } => format!("{stdout}\n{stderr}"),
            _ if stdout.trim().is_empty() => stderr.into_owned(),
            _ => stdout.into_owned(),
        };

        if raw.trim().is_empty() {
            return ProbeResult::Inconclusive(format!("{} printed nothing", binary.display()));
        }

        match self.extract(&raw) {
            Some(version) => ProbeResult::Found(version),
            None => ProbeResult::Inconclusive(format!(
                "could not parse version from output: {}",
                raw.lines().next().unwrap_or_default().trim()
            )),
        }
    }
}

/// Spawn the binary, retrying while the kernel reports it busy.
///
/// A binary that was just renamed into place can briefly fail with ETXTBSY
/// when another thread forked while the staging file was still open.
fn spawn(binary: &Path, args: &[String]) -> io::Result<Output> {
    let mut attempts = 0;
    loop {
        let result = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .output();
        match result {
            Err(e) if is_text_busy(&e) && attempts < BUSY_RETRIES => {
                attempts += 1;
                thread::sleep(BUSY_BACKOFF);
            }
            other => return other,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_field_first_line() {
        let probe = VersionProbe::last_field();
        let raw = "runc version 1.1.12\ncommit: v1.1.12-0-g51d5e946\nspec: 1.0.2-dev\n";
        assert_eq!(probe.extract(raw), Some("1.1.12".to_string()));
    }

    #[test]
    fn test_last_field_with_prefix() {
        let probe = VersionProbe::PlainTextLastField {
            args: default_args(),
            line_prefix: Some("etcd Version:".to_string()),
        };
        let raw = "etcd Version: 3.5.15\nGit SHA: 9a5533382\nGo Version: go1.21.12\n";
        assert_eq!(probe.extract(raw), Some("3.5.15".to_string()));
    }

    #[test]
    fn test_last_field_prefix_missing() {
        let probe = VersionProbe::PlainTextLastField {
            args: default_args(),
            line_prefix: Some("etcd Version:".to_string()),
        };
        assert_eq!(probe.extract("something else\n"), None);
    }

    #[test]
    fn test_last_field_skips_blank_lines() {
        let probe = VersionProbe::last_field();
        assert_eq!(
            probe.extract("\n\nKubernetes v1.30.2\n"),
            Some("v1.30.2".to_string())
        );
        assert_eq!(probe.extract("   \n"), None);
    }

    #[test]
    fn test_json_field_path() {
        let probe = VersionProbe::JsonFieldPath {
            args: vec!["version".into(), "-o".into(), "json".into()],
            path: "clientVersion.gitVersion".to_string(),
        };
        let raw = r#"{
  "clientVersion": {
    "major": "1",
    "minor": "30",
    "gitVersion": "v1.30.2"
  },
  "kustomizeVersion": "v5.0.4-0.20230601165947-6ce0bf390ce3"
}"#;
        assert_eq!(probe.extract(raw), Some("v1.30.2".to_string()));
    }

    #[test]
    fn test_json_field_path_missing_or_not_string() {
        let probe = VersionProbe::JsonFieldPath {
            args: vec![],
            path: "clientVersion.gitVersion".to_string(),
        };
        assert_eq!(probe.extract(r#"{"clientVersion":{}}"#), None);
        assert_eq!(probe.extract(r#"{"clientVersion":{"gitVersion":1}}"#), None);
        assert_eq!(probe.extract("not json"), None);
    }

    #[test]
    fn test_log_grep_capture_group() {
        let probe = VersionProbe::LogGrepPattern {
            args: default_args(),
            pattern: r"containerd\s+\S+\s+v?(\d+\.\d+\.\d+\S*)".to_string(),
        };
        let raw = "containerd github.com/containerd/containerd v1.7.19 2bf793ef6dc9a18e00cb12efb64355c2c9d5eb41\n";
        assert_eq!(probe.extract(raw), Some("1.7.19".to_string()));
    }

    #[test]
    fn test_log_grep_whole_match() {
        let probe = VersionProbe::LogGrepPattern {
            args: default_args(),
            pattern: r"\d+\.\d+\.\d+".to_string(),
        };
        assert_eq!(
            probe.extract("level=info msg=\"starting\" version=2.0.1"),
            Some("2.0.1".to_string())
        );
        assert_eq!(probe.extract("no digits here"), None);
    }

    #[test]
    fn test_validate() {
        assert!(VersionProbe::last_field().validate().is_ok());
        let bad_regex = VersionProbe::LogGrepPattern {
            args: vec![],
            pattern: "(".to_string(),
        };
        assert!(bad_regex.validate().is_err());
        let bad_path = VersionProbe::JsonFieldPath {
            args: vec![],
            path: "clientVersion..gitVersion".to_string(),
        };
        assert!(bad_path.validate().is_err());
    }

    #[test]
    fn test_run_missing_binary_is_inconclusive() {
        let dir = tempfile::tempdir().unwrap();
        let result = VersionProbe::last_field().run(&dir.path().join("runc"));
        assert!(matches!(result, ProbeResult::Inconclusive(_)));
        assert_eq!(result.version(), None);
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    #[cfg(unix)]
    fn test_run_found() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "kubelet", "echo 'Kubernetes v1.30.2'");
        let result = VersionProbe::last_field().run(&bin);
        assert_eq!(result, ProbeResult::Found("v1.30.2".to_string()));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_falls_back_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "tool", "echo 'tool 0.4.0' >&2");
        let result = VersionProbe::last_field().run(&bin);
        assert_eq!(result, ProbeResult::Found("0.4.0".to_string()));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_nonzero_exit_is_inconclusive() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "broken", "echo 'tool 1.0.0'; exit 3");
        assert!(matches!(
            VersionProbe::last_field().run(&bin),
            ProbeResult::Inconclusive(_)
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_empty_output_is_inconclusive() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "silent", "true");
        assert!(matches!(
            VersionProbe::last_field().run(&bin),
            ProbeResult::Inconclusive(_)
        ));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let probe: VersionProbe = toml::from_str(
            r#"
kind = "json-field-path"
args = ["version", "--client", "-o", "json"]
path = "clientVersion.gitVersion"
"#,
        )
        .unwrap();
        assert_eq!(
            probe,
            VersionProbe::JsonFieldPath {
                args: vec![
                    "version".into(),
                    "--client".into(),
                    "-o".into(),
                    "json".into()
                ],
                path: "clientVersion.gitVersion".to_string(),
            }
        );

        let probe: VersionProbe = toml::from_str(r#"kind = "plain-text-last-field""#).unwrap();
        assert_eq!(probe, VersionProbe::last_field());
    }
}
