//! `nodestrap unit`: render the one-shot service unit for a component.

use anyhow::{Context as _, Result};
use installkit::unit;
use std::fs;
use std::path::Path;

use crate::Context;
use crate::cli::UnitArgs;
use crate::commands;
use crate::ui;

pub fn run(ctx: &Context, args: UnitArgs) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let component = config
        .select(std::slice::from_ref(&args.component))?
        .remove(0);

    let exe = match args.exe {
        Some(exe) => exe,
        None => std::env::current_exe().context("Cannot determine the nodestrap executable")?,
    };
    let rendered = unit::render_oneshot_unit(&component.spec, &exe, config_arg(ctx));

    match args.output_dir {
        None => print!("{rendered}"),
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
            let path = dir.join(unit::unit_name(&component.spec.name));
            fs::write(&path, rendered)
                .with_context(|| format!("Could not write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!("Wrote {}", path.display()));
                ui::dim(&format!(
                    "Enable with: systemctl enable {}",
                    unit::unit_name(&component.spec.name)
                ));
            }
        }
    }

    Ok(())
}

/// The config path to bake into the unit: only one the operator named.
fn config_arg(ctx: &Context) -> Option<&Path> {
    ctx.config_explicit.then_some(ctx.config_path.as_path())
}
