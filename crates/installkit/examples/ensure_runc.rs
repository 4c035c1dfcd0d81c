//! Example: Ensure runc is installed
//!
//! Run with: cargo run -p installkit --example ensure_runc -- [VERSION] [INSTALL_PATH]
//!
//! Installs into a throwaway directory by default so it does not need root.

use installkit::{InstallOutcome, Installer, InstallerOptions, catalog, platform};
use std::path::PathBuf;

fn main() {
    println!("runc Installer");
    println!("==============\n");

    let mut args = std::env::args().skip(1);
    let Some(mut spec) = catalog::get("runc") else {
        eprintln!("runc missing from the built-in catalog");
        std::process::exit(1);
    };
    if let Some(version) = args.next() {
        spec.version = version;
    }
    spec.install_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("nodestrap-example/runc"));

    let platform = match platform::detect() {
        Ok(platform) => platform,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let installer = Installer::new(InstallerOptions::new(platform));
    println!("Platform:        {}", installer.platform());
    println!("Target version:  {}", spec.normalized_version());
    println!("Current version: {}", installer.current_version(&spec));
    println!("Install path:    {}\n", spec.install_path.display());

    match installer.ensure_installed(&spec) {
        InstallOutcome::Failed { stage, error } => {
            eprintln!("Installation failed at {stage}: {error}");
            eprintln!("  {}", error.category().advice());
            std::process::exit(1);
        }
        outcome => println!("runc: {outcome}"),
    }
}
