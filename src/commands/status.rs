use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::cli::StatusArgs;
use crate::commands;
use crate::ui;

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let components = config.select(&args.components)?;
    let installer = commands::installer(ctx, &config.settings, None, None)?;

    let statuses: Vec<_> = components
        .iter()
        .map(|c| installer.status(&c.spec))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    ui::header(&format!("Component Status ({})", installer.platform()));
    println!();

    let name_width = ui::column_width(statuses.iter().map(|s| s.name.as_str()), 9);
    let current_width = ui::column_width(statuses.iter().map(|s| s.current.as_str()), 9);
    let target_width = ui::column_width(statuses.iter().map(|s| s.target.as_str()), 6);

    println!(
        "  {} {} {} {}",
        ui::pad("COMPONENT", name_width).dimmed(),
        ui::pad("INSTALLED", current_width).dimmed(),
        ui::pad("TARGET", target_width).dimmed(),
        "STATE".dimmed()
    );

    let mut outdated = 0;
    for status in &statuses {
        let state = if status.up_to_date {
            "✓ up to date".green()
        } else if status.current == installkit::version::NONE {
            outdated += 1;
            "✗ missing".red()
        } else {
            outdated += 1;
            "⚠ differs".yellow()
        };
        println!(
            "  {} {} {} {}",
            ui::pad(&status.name, name_width).bold(),
            ui::pad(&status.current, current_width),
            ui::pad(&status.target, target_width),
            state
        );
    }

    if !ctx.quiet {
        println!();
        if outdated == 0 {
            ui::success("All components are at their target versions");
        } else {
            ui::info(&format!(
                "{outdated} component(s) need installing; run 'nodestrap install'"
            ));
        }
    }

    Ok(())
}
