pub mod config;
pub mod install;
pub mod list;
pub mod status;
pub mod unit;

use crate::Context;
use crate::config::{Config, Settings};
use anyhow::Result;
use installkit::backend::http::HttpBackend;
use installkit::{Installer, InstallerOptions, Platform, platform};
use std::path::PathBuf;
use std::time::Duration;

/// Load the configuration the context points at.
pub fn load_config(ctx: &Context) -> Result<Config> {
    Config::load(&ctx.config_path, ctx.config_explicit)
}

/// Platform to install for: the detected one, with the architecture
/// replaced when `arch` is given.
pub fn resolve_platform(arch: Option<&str>) -> Result<Platform> {
    match arch {
        Some(arch) => Ok(platform::detect()
            .map(|p| p.with_arch(arch))
            .unwrap_or_else(|_| Platform::linux(arch))),
        None => Ok(platform::detect()?),
    }
}

/// Build an HTTPS installer from settings plus command-line overrides.
pub fn installer(
    ctx: &Context,
    settings: &Settings,
    arch: Option<&str>,
    scratch_dir: Option<PathBuf>,
) -> Result<Installer> {
    let platform = resolve_platform(arch.or(settings.arch.as_deref()))?;

    let mut options = InstallerOptions::new(platform).cancel(ctx.cancel.clone());
    if let Some(dir) = scratch_dir.map_or_else(|| settings.scratch_path(), |dir| Ok(Some(dir)))? {
        options = options.scratch_dir(dir);
    }

    let backend = HttpBackend::with_timeouts(
        Duration::from_secs(settings.download_timeout_secs),
        Duration::from_secs(settings.connect_timeout_secs),
    );
    Ok(Installer::with_backend(Box::new(backend), options))
}
