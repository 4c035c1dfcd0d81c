//! Built-in component table.
//!
//! These are the components a Kubernetes node needs before `kubeadm` can
//! run. Configuration may override any field, most commonly `version`.

use crate::checksum::ChecksumRule;
use crate::probe::VersionProbe;
use crate::types::{ArchiveKind, ComponentSpec};
use std::path::PathBuf;

/// Names of the built-in components, in install order.
pub const NAMES: &[&str] = &[
    "runc",
    "containerd",
    "kubelet",
    "kubeadm",
    "kubectl",
    "etcd",
    "crictl",
];

const KUBERNETES_VERSION: &str = "1.30.2";
const KUBERNETES_RELEASES: &str = "https://dl.k8s.io/release";

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn runc() -> ComponentSpec {
    ComponentSpec {
        name: "runc".to_string(),
        version: "1.1.12".to_string(),
        repository: "https://github.com/opencontainers/runc/releases/download".to_string(),
        binary_url: "{repo}/{tag}/runc.{arch}".to_string(),
        checksum_url: "{repo}/{tag}/runc.sha256sum".to_string(),
        install_path: PathBuf::from("/usr/local/sbin/runc"),
        probe: VersionProbe::PlainTextLastField {
            args: args(&["--version"]),
            line_prefix: Some("runc version".to_string()),
        },
        archive: ArchiveKind::RawBinary,
        checksum: ChecksumRule::multi_file(),
    }
}

fn containerd() -> ComponentSpec {
    ComponentSpec {
        name: "containerd".to_string(),
        version: "1.7.19".to_string(),
        repository: "https://github.com/containerd/containerd/releases/download".to_string(),
        binary_url: "{repo}/{tag}/containerd-{version}-{os}-{arch}.tar.gz".to_string(),
        checksum_url: "{repo}/{tag}/containerd-{version}-{os}-{arch}.tar.gz.sha256sum"
            .to_string(),
        install_path: PathBuf::from("/usr/local/bin"),
        // "containerd github.com/containerd/containerd v1.7.19 2bf793ef..."
        probe: VersionProbe::LogGrepPattern {
            args: args(&["--version"]),
            pattern: r"containerd\s+\S+\s+v?(\d+\.\d+\.\d+\S*)".to_string(),
        },
        archive: ArchiveKind::TarGz {
            members: args(&["bin/containerd", "bin/containerd-shim-runc-v2", "bin/ctr"]),
        },
        checksum: ChecksumRule::multi_file(),
    }
}

fn kubernetes(name: &str, probe: VersionProbe) -> ComponentSpec {
    ComponentSpec {
        name: name.to_string(),
        version: KUBERNETES_VERSION.to_string(),
        repository: KUBERNETES_RELEASES.to_string(),
        binary_url: format!("{{repo}}/{{tag}}/bin/{{os}}/{{arch}}/{name}"),
        checksum_url: format!("{{repo}}/{{tag}}/bin/{{os}}/{{arch}}/{name}.sha256"),
        install_path: PathBuf::from("/usr/local/bin").join(name),
        probe,
        archive: ArchiveKind::RawBinary,
        checksum: ChecksumRule::single_hash(),
    }
}

fn kubelet() -> ComponentSpec {
    // "Kubernetes v1.30.2"
    kubernetes("kubelet", VersionProbe::last_field())
}

fn kubeadm() -> ComponentSpec {
    kubernetes(
        "kubeadm",
        VersionProbe::JsonFieldPath {
            args: args(&["version", "-o", "json"]),
            path: "clientVersion.gitVersion".to_string(),
        },
    )
}

fn kubectl() -> ComponentSpec {
    kubernetes(
        "kubectl",
        VersionProbe::JsonFieldPath {
            args: args(&["version", "--client", "-o", "json"]),
            path: "clientVersion.gitVersion".to_string(),
        },
    )
}

fn etcd() -> ComponentSpec {
    ComponentSpec {
        name: "etcd".to_string(),
        version: "3.5.15".to_string(),
        repository: "https://github.com/etcd-io/etcd/releases/download".to_string(),
        binary_url: "{repo}/{tag}/etcd-{tag}-{os}-{arch}.tar.gz".to_string(),
        checksum_url: "{repo}/{tag}/SHA256SUMS".to_string(),
        install_path: PathBuf::from("/usr/local/bin"),
        probe: VersionProbe::PlainTextLastField {
            args: args(&["--version"]),
            line_prefix: Some("etcd Version:".to_string()),
        },
        archive: ArchiveKind::TarGz {
            members: args(&[
                "etcd-{tag}-{os}-{arch}/etcd",
                "etcd-{tag}-{os}-{arch}/etcdctl",
                "etcd-{tag}-{os}-{arch}/etcdutl",
            ]),
        },
        checksum: ChecksumRule::multi_file(),
    }
}

fn crictl() -> ComponentSpec {
    ComponentSpec {
        name: "crictl".to_string(),
        version: "1.30.0".to_string(),
        repository: "https://github.com/kubernetes-sigs/cri-tools/releases/download".to_string(),
        binary_url: "{repo}/{tag}/crictl-{tag}-{os}-{arch}.tar.gz".to_string(),
        checksum_url: "{repo}/{tag}/crictl-{tag}-{os}-{arch}.tar.gz.sha256".to_string(),
        install_path: PathBuf::from("/usr/local/bin"),
        // "crictl version v1.30.0"
        probe: VersionProbe::last_field(),
        archive: ArchiveKind::TarGz {
            members: args(&["crictl"]),
        },
        checksum: ChecksumRule::single_hash(),
    }
}

/// All built-in components, in install order.
#[must_use]
pub fn builtin() -> Vec<ComponentSpec> {
    vec![
        runc(),
        containerd(),
        kubelet(),
        kubeadm(),
        kubectl(),
        etcd(),
        crictl(),
    ]
}

/// Look up a built-in component by name.
#[must_use]
pub fn get(name: &str) -> Option<ComponentSpec> {
    builtin().into_iter().find(|spec| spec.name == name)
}
