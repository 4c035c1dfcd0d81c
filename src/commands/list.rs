use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::commands;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let components = config.components()?;

    ui::header("Components");
    ui::kv("Config", &ctx.config_path.display().to_string());
    println!();

    let name_width = ui::column_width(components.iter().map(|c| c.spec.name.as_str()), 9);
    let version_width =
        ui::column_width(components.iter().map(|c| c.spec.normalized_version()), 7);

    println!(
        "  {} {} {} {}",
        ui::pad("COMPONENT", name_width).dimmed(),
        ui::pad("VERSION", version_width).dimmed(),
        ui::pad("KIND", 6).dimmed(),
        "INSTALL PATH".dimmed()
    );

    for component in &components {
        let spec = &component.spec;
        let name = ui::pad(&spec.name, name_width);
        let mut line = format!(
            "  {} {} {} {}",
            if component.enabled {
                name.bold()
            } else {
                name.dimmed()
            },
            ui::pad(spec.normalized_version(), version_width),
            ui::pad(spec.archive.label(), 6),
            spec.install_path.display()
        );
        if !component.enabled {
            line.push_str(&format!(" {}", "(disabled)".dimmed()));
        }
        if !component.builtin {
            line.push_str(&format!(" {}", "(custom)".cyan()));
        }
        println!("{line}");
    }

    Ok(())
}
