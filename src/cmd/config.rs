use std::path::Path;

use anyhow::{Result, bail};
use boardsync::config::{CliOverrides, Config, EnvOverrides, SyncToml};

use crate::ConfigCommands;

pub fn cmd_config(
    path: &Path,
    overrides: &CliOverrides,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => show(path, overrides),
        ConfigCommands::Init { force } => init(path, force),
    }
}

fn show(path: &Path, overrides: &CliOverrides) -> Result<()> {
    let file = SyncToml::load_or_default(path)?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    let effective = Config::resolve(&file, &EnvOverrides::from_env(), overrides)?;

    println!("{} {}", console::style("Config file:").bold(), source);
    println!();
    println!("{}", console::style("[remote]").cyan());
    println!("  api_base             = {}", file.remote.api_base);
    println!("  request_timeout_secs = {}", file.remote.request_timeout_secs);
    println!("{}", console::style("[refresh]").cyan());
    println!("  interval_secs        = {}", file.refresh.interval_secs);
    println!("{}", console::style("[cache]").cyan());
    match &file.cache.path {
        Some(p) => println!("  path                 = {}", p.display()),
        None => println!("  path                 = {}", console::style("(default)").dim()),
    }
    println!("{}", console::style("[logging]").cyan());
    println!("  debug_http           = {}", file.logging.debug_http);
    println!();
    println!("{}", console::style("Effective").bold());
    println!("  api base:         {}", effective.api_base);
    println!("  request timeout:  {}s", effective.request_timeout.as_secs());
    println!("  refresh interval: {}s", effective.refresh_interval.as_secs());
    println!("  cache:            {}", effective.cache_path.display());
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }
    SyncToml::default().save(path)?;
    println!(
        "{} Wrote default configuration to {}",
        console::style("✓").green(),
        path.display()
    );
    Ok(())
}
