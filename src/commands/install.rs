//! `nodestrap install`: bring components to their target versions.
//!
//! Every selected component runs to completion even when another fails; the
//! command exits non-zero afterwards if any of them failed.

use crate::Context;
use crate::cli::InstallArgs;
use crate::commands;
use crate::ui;
use anyhow::{Result, bail};
use installkit::{ComponentSpec, InstallOutcome, Installer, Report};

pub fn run(ctx: &Context, args: InstallArgs) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let components = config.select(&args.components)?;

    if components.is_empty() {
        ui::warn("No components enabled. Check the [components] section of the config.");
        return Ok(());
    }

    let jobs = args.jobs.unwrap_or(config.settings.jobs).max(1);
    let installer = commands::installer(
        ctx,
        &config.settings,
        args.arch.as_deref(),
        args.scratch_dir,
    )?;
    let specs: Vec<ComponentSpec> = components.into_iter().map(|c| c.spec).collect();

    if args.dry_run {
        return dry_run(ctx, &installer, &specs);
    }

    if !ctx.quiet {
        ui::header(&format!("Installing for {}", installer.platform()));
    }

    let results = if jobs == 1 || specs.len() == 1 {
        specs
            .iter()
            .map(|spec| {
                let pb = if ctx.quiet {
                    None
                } else {
                    ui::spinner(&format!("{} {}", spec.name, spec.normalized_version()))
                };
                let outcome = installer.ensure_installed(spec);
                ui::finish(pb);
                print_outcome(ctx, &spec.name, &outcome);
                (spec.name.clone(), outcome)
            })
            .collect::<Vec<_>>()
    } else {
        let pb = if ctx.quiet {
            None
        } else {
            ui::spinner(&format!("{} components, {jobs} at a time", specs.len()))
        };
        let results = installer.ensure_all(&specs, jobs);
        ui::finish(pb);
        for (name, outcome) in &results {
            print_outcome(ctx, name, outcome);
        }
        results
    };

    let report = Report::from_outcomes(results.iter().map(|(_, outcome)| outcome));
    if !ctx.quiet {
        println!();
        ui::kv("Summary", &report.to_string());
    }

    if ctx.cancel.is_cancelled() {
        bail!("Interrupted");
    }
    if !report.is_success() {
        bail!("{} of {} components failed", report.failed, results.len());
    }
    Ok(())
}

fn print_outcome(ctx: &Context, name: &str, outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::Skipped { .. } => {
            if !ctx.quiet {
                ui::success(&format!("{name}: {outcome}"));
            }
        }
        InstallOutcome::Installed { paths, .. } => {
            if !ctx.quiet {
                ui::success(&format!("{name}: {outcome}"));
                if ctx.verbose > 0 {
                    for path in paths {
                        ui::dim(&path.display().to_string());
                    }
                }
            }
        }
        InstallOutcome::Failed { error, .. } => {
            ui::error(&format!("{name}: {outcome}"));
            if !ctx.quiet {
                ui::dim(error.category().advice());
            }
        }
    }
}

/// Probe only: report what `install` would do without touching the network.
fn dry_run(ctx: &Context, installer: &Installer, specs: &[ComponentSpec]) -> Result<()> {
    let platform = installer.platform();
    if !ctx.quiet {
        ui::header(&format!("Dry run for {platform}"));
    }

    let mut pending = 0;
    let mut invalid = 0;

    for spec in specs {
        if let Err(e) = spec.validate() {
            ui::error(&e.to_string());
            invalid += 1;
            continue;
        }

        let status = installer.status(spec);
        if status.up_to_date {
            if !ctx.quiet {
                ui::success(&format!("{}: {} already installed", spec.name, status.current));
            }
            continue;
        }

        pending += 1;
        ui::info(&format!(
            "{}: would install {} (installed: {})",
            spec.name, status.target, status.current
        ));
        if !ctx.quiet {
            ui::kv("from", &spec.binary_url(platform));
            ui::kv("checksum", &spec.checksum_url(platform));
            for target in spec.install_targets(platform) {
                ui::kv("to", &target.display().to_string());
            }
        }
    }

    if !ctx.quiet {
        println!();
        ui::kv(
            "Summary",
            &format!(
                "{pending} to install, {} up to date",
                specs.len() - pending - invalid
            ),
        );
    }

    if invalid > 0 {
        bail!("{invalid} component(s) have invalid specifications");
    }
    Ok(())
}
