use anyhow::{Context as _, Result, bail};
use std::fs;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::commands;
use crate::config::{ComponentOverride, Config};
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Init { force } => init(ctx, force),
        ConfigCommand::Validate => validate(ctx),
        ConfigCommand::Path => path(ctx),
    }
}

/// Print the effective table, built-ins merged with the file, as TOML.
fn show(ctx: &Context) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let effective = Config {
        components: config
            .components()?
            .into_iter()
            .map(|c| {
                let mut entry = ComponentOverride::from(&c.spec);
                entry.enabled = Some(c.enabled);
                (c.spec.name.clone(), entry)
            })
            .collect(),
        settings: config.settings,
    };
    print!("{}", effective.to_toml()?);
    Ok(())
}

fn init(ctx: &Context, force: bool) -> Result<()> {
    let path = &ctx.config_path;
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(path, Config::builtin().to_toml()?)
        .with_context(|| format!("Could not write {}", path.display()))?;

    if !ctx.quiet {
        ui::success(&format!("Wrote built-in components to {}", path.display()));
    }
    Ok(())
}

fn validate(ctx: &Context) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let problems = config.validate()?;

    if problems.is_empty() {
        if !ctx.quiet {
            let count = config.components()?.len();
            ui::success(&format!("{count} components valid"));
        }
        return Ok(());
    }

    for problem in &problems {
        ui::error(problem);
    }
    bail!("{} invalid component(s)", problems.len());
}

fn path(ctx: &Context) -> Result<()> {
    println!("{}", ctx.config_path.display());
    if !ctx.quiet && !ctx.config_path.exists() {
        ui::dim("(not present; built-in components are used)");
    }
    Ok(())
}
