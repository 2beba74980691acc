use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use wand::config::formulas_repo_url;
use wand::orchestrator::{DoctorReport, UpdateOutcome};
use wand::shims::exec_binary;
use wand::util::split_name_at_version;
use wand::wandfile::{Wandfile, WandfileService};
use wand::{
    FormulaRepository, InstallOptions, InstallOrchestrator, JsonRegistryStore, Platform,
    ShimService, WandPaths,
};
use crate::cli::{WandCommand, WandfileCommand, CLI};

/// Sets up logging to stderr. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wand={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn execute(cli: CLI) -> Result<()> {
    let paths = WandPaths::from_env()?;
    // Read-only commands report on the setup as it is.
    if !matches!(cli.command, WandCommand::Doctor | WandCommand::ShimExec { .. }) {
        paths.ensure_dirs()?;
    }
    let wand_exe = std::env::current_exe().context("Could not locate the wand executable")?;
    let cwd = std::env::current_dir()?;
    // `shim-exec` must stay free of the HTTP clients.
    let wand = || InstallOrchestrator::with_defaults(paths.clone(), Platform::current(), wand_exe.clone());

    match cli.command {
        WandCommand::Install { name_at_version, global, force } => {
            execute_install(&wand()?, &name_at_version, InstallOptions { global, force })
        }
        WandCommand::Uninstall { name_at_version } => {
            execute_uninstall(&wand()?, &name_at_version)
        }
        WandCommand::Update { name } => {
            execute_update(&wand()?, &name)
        }
        WandCommand::List { name } => {
            execute_list(&wand()?, name.as_deref())
        }
        WandCommand::Versions { name } => {
            execute_versions(&wand()?, &name)
        }
        WandCommand::Use { name, version, global } => {
            wand()?.use_version(&name, &version, global, &cwd)?;
            let scope = if global { "globally".to_string() } else { format!("in {}", cwd.display()) };
            println!("{} Using {name}@{version} {scope}", "✓".green());
            Ok(())
        }
        WandCommand::Init => {
            let path = wand()?.init_project(&cwd)?;
            println!("{} Created {}", "✓".green(), path.display());
            Ok(())
        }
        WandCommand::Add { name_at_version } => {
            execute_add(&wand()?, &cwd, &name_at_version)
        }
        WandCommand::Remove { name } => {
            let path = wand()?.remove_from_project(&cwd, &name)?;
            println!("{} Removed {name} from {}", "✓".green(), path.display());
            Ok(())
        }
        WandCommand::Which { name } => {
            println!("{}", wand()?.which(&name, &cwd)?.display());
            Ok(())
        }
        WandCommand::Search { term } => {
            execute_search(&wand()?, &term)
        }
        WandCommand::Outdated => {
            execute_outdated(&wand()?)
        }
        WandCommand::Doctor => {
            execute_doctor(&wand()?.doctor())
        }
        WandCommand::Sync => {
            wand()?.sync_formulas()?;
            println!("{} Formulas synced from {}", "✓".green(), formulas_repo_url());
            Ok(())
        }
        WandCommand::Rehash => {
            let count = wand()?.rehash()?;
            println!("{} Rebuilt {count} shims", "✓".green());
            Ok(())
        }
        WandCommand::Wandfile { command } => {
            execute_wandfile(&wand()?, command)
        }
        WandCommand::ShimExec { package, binary, args } => {
            execute_shim(paths.clone(), wand_exe.clone(), &cwd, &package, &binary, args)
        }
    }
}

/// Resolves the binary behind a shim and replaces this process with it.
fn execute_shim(
    paths: WandPaths,
    wand_exe: PathBuf,
    cwd: &Path,
    package: &str,
    binary: &str,
    args: Vec<OsString>,
) -> Result<()> {
    let registry = Arc::new(JsonRegistryStore::new(paths.registry_file()));
    let formulas = Arc::new(FormulaRepository::new(paths.formulas_dir(), formulas_repo_url()));
    let shims = ShimService::new(paths, registry, formulas, wand_exe);
    let path = shims.resolve_binary(package, binary, cwd)?;
    let code = exec_binary(&path, &args)?;
    std::process::exit(code)
}

pub fn execute_install(wand: &InstallOrchestrator, name_at_version: &str, options: InstallOptions) -> Result<()> {
    let (name, version) = split_name_at_version(name_at_version);
    let package = wand.install_package_with_options(name, version.unwrap_or(""), options)?;
    println!("{} Installed {}", "✓".green(), package.identifier().bold());
    Ok(())
}

pub fn execute_uninstall(wand: &InstallOrchestrator, name_at_version: &str) -> Result<()> {
    let (name, version) = split_name_at_version(name_at_version);
    for package in wand.uninstall_package(name, version)? {
        println!("{} Uninstalled {}", "✓".green(), package.identifier());
    }
    Ok(())
}

pub fn execute_update(wand: &InstallOrchestrator, name: &str) -> Result<()> {
    match wand.update_package(name)? {
        UpdateOutcome::Updated(package) => {
            println!("{} Updated to {}", "✓".green(), package.identifier().bold());
        }
        UpdateOutcome::UpToDate(version) => {
            println!("{name}@{version} is already the latest version");
        }
    }
    Ok(())
}

pub fn execute_list(wand: &InstallOrchestrator, name: Option<&str>) -> Result<()> {
    let registry = wand.installed()?;
    if let Some(name) = name {
        let entry = registry
            .get_entry(name)
            .with_context(|| format!("{name} is not installed"))?;
        for package in entry.sorted_versions() {
            let marker = if package.is_global { "*".green().to_string() } else { " ".to_string() };
            println!("{marker} {}", package.version);
        }
        return Ok(());
    }

    let mut empty = true;
    for entry in registry.entries() {
        empty = false;
        let versions: Vec<String> = entry
            .sorted_versions()
            .iter()
            .map(|p| p.version.to_string())
            .collect();
        let global = registry.global_version(&entry.name).unwrap_or("-");
        println!(
            "{} ({}) global: {} installed: {}",
            entry.name.bold(),
            entry.package_type,
            global,
            versions.join(", ")
        );
    }
    if empty {
        println!("No packages installed");
    }
    Ok(())
}

pub fn execute_versions(wand: &InstallOrchestrator, name: &str) -> Result<()> {
    let registry = wand.installed()?;
    for version in wand.versions().list_available_versions(name)? {
        if registry.has_version(name, &version.to_string()) {
            println!("{} {}", version, "(installed)".green());
        } else {
            println!("{version}");
        }
    }
    Ok(())
}

fn execute_add(wand: &InstallOrchestrator, cwd: &Path, name_at_version: &str) -> Result<()> {
    let (name, version) = split_name_at_version(name_at_version);
    let Some(version) = version else {
        bail!("Expected <name>@<version>, got {name_at_version:?}");
    };
    let path = wand.add_to_project(cwd, name, version)?;
    println!("{} Pinned {name}@{version} in {}", "✓".green(), path.display());
    Ok(())
}

pub fn execute_search(wand: &InstallOrchestrator, term: &str) -> Result<()> {
    let found = wand.search(term)?;
    if found.is_empty() {
        println!("No formulas match {term:?}. Run `wand sync` to refresh formulas.");
    }
    let platform = wand.platform();
    for formula in found {
        let availability = if formula.supports(platform) {
            String::new()
        } else {
            format!(" {}", format!("(not available for {platform})").dimmed())
        };
        println!(
            "{} ({}) {}{availability}",
            formula.name.bold(),
            formula.package_type,
            formula.description
        );
    }
    Ok(())
}

pub fn execute_outdated(wand: &InstallOrchestrator) -> Result<()> {
    let outdated = wand.outdated()?;
    if outdated.is_empty() {
        println!("All packages are up to date");
    }
    for package in outdated {
        println!("{} {} -> {}", package.name.bold(), package.current, package.latest.to_string().green());
    }
    Ok(())
}

pub fn execute_doctor(report: &DoctorReport) -> Result<()> {
    let check = |ok: bool| if ok { "✓".green() } else { "✗".red() };
    println!("{} wand directory: {}", check(report.wand_dir_exists), report.wand_dir.display());
    println!("{} platform: {}", check(report.platform_supported), report.platform);
    match &report.registry_error {
        None => println!("{} registry: {} packages", check(true), report.package_count),
        Some(error) => println!("{} registry: {error}", check(false)),
    }
    match &report.formulas_error {
        None => println!("{} formulas: {}", check(true), report.formula_count),
        Some(error) => println!("{} formulas: {error}", check(false)),
    }
    println!(
        "{} shims on PATH: {}",
        check(report.shims_on_path),
        report.shims_dir.display()
    );
    if !report.shims_on_path {
        println!("  add to your shell profile: export PATH=\"{}:$PATH\"", report.shims_dir.display());
    }
    if !report.is_healthy() {
        bail!("wand doctor found problems");
    }
    Ok(())
}

pub fn execute_wandfile(wand: &InstallOrchestrator, command: WandfileCommand) -> Result<()> {
    let service = WandfileService::new(wand);
    match command {
        WandfileCommand::Install { file } => {
            let wandfile = Wandfile::load(&file)?;
            let report = service.install(&wandfile)?;
            for installed in &report.installed {
                println!("{} Installed {installed}", "✓".green());
            }
            for present in &report.already_installed {
                println!("  {present} already installed");
            }
            if report.dotfiles_skipped {
                println!("{} dotfiles section skipped", "!".yellow());
            }
        }
        WandfileCommand::Check { file } => {
            let missing = service.check(&Wandfile::load(&file)?)?;
            if !missing.is_empty() {
                for entry in &missing {
                    println!("{} {entry}", "✗".red());
                }
                bail!("{} packages from {} are not installed", missing.len(), file.display());
            }
            println!("{} Everything in {} is installed", "✓".green(), file.display());
        }
        WandfileCommand::Dump { file } => {
            service.dump()?.save(&file)?;
            println!("{} Wrote {}", "✓".green(), file.display());
        }
        WandfileCommand::Update { file } => {
            let report = service.update(&file)?;
            for bump in &report.updated {
                println!("{} {}: {} -> {}", "✓".green(), bump.name, bump.from, bump.to);
            }
            for (name, reason) in &report.skipped {
                println!("{} Skipped {name}: {reason}", "!".yellow());
            }
            println!("Update complete: {} updated, {} skipped", report.updated.len(), report.skipped.len());
        }
    }
    Ok(())
}
