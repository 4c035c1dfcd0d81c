//! One-shot service units.
//!
//! A node provisioner typically runs each component install once per boot,
//! before the container runtime and kubelet start. These helpers render a
//! systemd unit for that; installing and enabling it is up to the caller.

use crate::types::ComponentSpec;
use std::path::Path;

/// File name of the unit for `component`.
#[must_use]
pub fn unit_name(component: &str) -> String {
    format!("nodestrap-{component}.service")
}

/// Render a `Type=oneshot` unit that runs `exe install <name>` once the
/// network is online.
///
/// `--config <config>` is only added when `config` is given; without it the
/// command reads the default path and falls back to the built-in catalog
/// when that file is absent. `SyslogIdentifier` carries the component name
/// so journal lines keep the per-component tag.
#[must_use]
pub fn render_oneshot_unit(spec: &ComponentSpec, exe: &Path, config: Option<&Path>) -> String {
    let name = &spec.name;
    let config = config
        .map(|path| format!(" --config {}", path.display()))
        .unwrap_or_default();
    format!(
        "\
[Unit]
Description=Ensure {name} {version} is installed
Wants=network-online.target
After=network-online.target

[Service]
Type=oneshot
RemainAfterExit=yes
ExecStart={exe} --verbose install {name}{config}
SyslogIdentifier=nodestrap-{name}

[Install]
WantedBy=multi-user.target
",
        version = spec.normalized_version(),
        exe = exe.display(),
    )
}
