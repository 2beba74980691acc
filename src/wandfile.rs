use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::error::{ErrorKind, Result, WandError};
use crate::formula::PackageType;
use crate::installer::normalize_version_key;
use crate::orchestrator::InstallOrchestrator;

pub const WANDFILE: &str = "wandfile";

/// A declarative list of packages to have installed.
///
/// ```toml
/// gui = ["firefox"]
///
/// [[cli]]
/// name = "node"
/// version = "22.1.0"
///
/// [[cli]]
/// name = "jq"
/// version = "latest"
///
/// [dotfiles]
/// repo = "https://github.com/me/dotfiles.git"
/// symlinks = { ".zshrc" = "zsh/zshrc" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wandfile {
    /// GUI applications, always installed at their newest release.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gui: Vec<String>,
    #[serde(default)]
    pub cli: Vec<WandfileCli>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dotfiles: Option<WandfileDotfiles>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WandfileCli {
    pub name: String,
    /// Exact version, or `latest`/empty for the newest release.
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WandfileDotfiles {
    pub repo: String,
    /// target (relative to home) -> source (relative to the repository)
    #[serde(default)]
    pub symlinks: BTreeMap<String, String>,
}

impl Wandfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Wandfile> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WandError::wrap(
                ErrorKind::FileNotFound,
                format!("Failed to read wandfile {}", path.display()),
                e,
            )
        })?;
        toml::from_str(&content).map_err(|e| {
            WandError::wrap(
                ErrorKind::ConfigInvalid,
                format!("Failed to parse wandfile {}", path.display()),
                e,
            )
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WandError::wrap(ErrorKind::ConfigInvalid, "Failed to serialize wandfile", e))?;
        std::fs::write(path, content).map_err(|e| {
            WandError::wrap(
                ErrorKind::PermissionDenied,
                format!("Failed to write wandfile {}", path.display()),
                e,
            )
        })
    }

    pub fn add_cli(&mut self, name: &str, version: &str) {
        self.cli.push(WandfileCli {
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    pub fn add_gui(&mut self, name: &str) {
        self.gui.push(name.to_string());
    }

    pub fn has_cli(&self, name: &str) -> bool {
        self.cli.iter().any(|cli| cli.name == name)
    }

    pub fn has_gui(&self, name: &str) -> bool {
        self.gui.iter().any(|gui| gui == name)
    }

    pub fn has_dotfiles(&self) -> bool {
        self.dotfiles.as_ref().is_some_and(|d| !d.repo.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.cli.is_empty() && self.gui.is_empty() && !self.has_dotfiles()
    }
}

/// What [`WandfileService::install`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub already_installed: Vec<String>,
    /// The wandfile has a dotfiles section, which wand does not manage.
    pub dotfiles_skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBump {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// What [`WandfileService::update`] did. Failed packages keep their old
/// version in the wandfile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub updated: Vec<VersionBump>,
    pub skipped: Vec<(String, String)>,
}

/// Applies wandfiles through an [`InstallOrchestrator`].
pub struct WandfileService<'a> {
    wand: &'a InstallOrchestrator,
}

impl<'a> WandfileService<'a> {
    pub fn new(wand: &'a InstallOrchestrator) -> Self {
        Self { wand }
    }

    /// Installs every CLI entry at its version and every GUI entry at its
    /// newest release. Entries that are already installed count as done; any
    /// other failure stops the run.
    pub fn install(&self, wandfile: &Wandfile) -> Result<InstallReport> {
        let mut report = InstallReport::default();
        let requests = wandfile
            .cli
            .iter()
            .map(|cli| (cli.name.as_str(), cli.version.as_str()))
            .chain(wandfile.gui.iter().map(|gui| (gui.as_str(), "latest")));

        for (name, version) in requests {
            let label = describe(name, version);
            match self.wand.install_package(name, version) {
                Ok(package) => report.installed.push(package.identifier()),
                Err(e) if e.is(ErrorKind::PackageInstalled) => report.already_installed.push(label),
                Err(e) => return Err(e.context(format!("Failed to install {label}"))),
            }
        }

        if wandfile.has_dotfiles() {
            warn!("Skipping dotfiles section; dotfiles are not managed by wand");
            report.dotfiles_skipped = true;
        }
        Ok(report)
    }

    /// Entries that are not installed, as `name@version` for CLI packages
    /// and `name` for GUI packages.
    pub fn check(&self, wandfile: &Wandfile) -> Result<Vec<String>> {
        let registry = self.wand.installed()?;
        let mut missing = Vec::new();
        for cli in &wandfile.cli {
            let present = if is_latest(&cli.version) {
                registry.has_package(&cli.name)
            } else {
                registry.has_version(&cli.name, &normalize_version_key(&cli.version))
            };
            if !present {
                missing.push(describe(&cli.name, &cli.version));
            }
        }
        missing.extend(
            wandfile
                .gui
                .iter()
                .filter(|gui| !registry.has_package(gui))
                .cloned(),
        );
        Ok(missing)
    }

    /// A wandfile describing what is installed: each CLI package at its
    /// current version, each GUI package by name.
    pub fn dump(&self) -> Result<Wandfile> {
        let registry = self.wand.installed()?;
        let mut wandfile = Wandfile::new();
        for entry in registry.entries() {
            match entry.package_type {
                PackageType::Cli => {
                    if let Some(package) = registry.current_package(&entry.name) {
                        wandfile.add_cli(&entry.name, &package.version_string());
                    }
                }
                PackageType::Gui => wandfile.add_gui(&entry.name),
                PackageType::Dotfile => {}
            }
        }
        Ok(wandfile)
    }

    /// Moves every CLI entry of the wandfile at `path` to the newest
    /// release, installs it and writes the file back. GUI entries are
    /// reinstalled at their newest release.
    pub fn update(&self, path: &Path) -> Result<UpdateReport> {
        let mut wandfile = Wandfile::load(path)?;
        let mut report = UpdateReport::default();

        for cli in wandfile.cli.iter_mut() {
            let latest = match self.wand.versions().latest_version(&cli.name) {
                Ok(latest) => latest.to_string(),
                Err(e) => {
                    warn!(package = %cli.name, error = %e, "Skipping update");
                    report.skipped.push((cli.name.clone(), e.to_string()));
                    continue;
                }
            };
            if !is_latest(&cli.version) && normalize_version_key(&cli.version) == latest {
                continue;
            }
            match self.wand.install_package(&cli.name, &latest) {
                Ok(_) => {}
                Err(e) if e.is(ErrorKind::PackageInstalled) => {}
                Err(e) => {
                    warn!(package = %cli.name, error = %e, "Skipping update");
                    report.skipped.push((cli.name.clone(), e.to_string()));
                    continue;
                }
            }
            info!(package = %cli.name, from = %cli.version, to = %latest, "Updated");
            report.updated.push(VersionBump {
                name: cli.name.clone(),
                from: cli.version.clone(),
                to: latest.clone(),
            });
            cli.version = latest;
        }

        for gui in &wandfile.gui {
            match self.wand.install_package(gui, "latest") {
                Ok(_) => {}
                Err(e) if e.is(ErrorKind::PackageInstalled) => {}
                Err(e) => {
                    warn!(package = %gui, error = %e, "Skipping update");
                    report.skipped.push((gui.clone(), e.to_string()));
                }
            }
        }

        wandfile.save(path)?;
        Ok(report)
    }
}

fn is_latest(version: &str) -> bool {
    version.is_empty() || version == "latest"
}

fn describe(name: &str, version: &str) -> String {
    if is_latest(version) {
        name.to_string()
    } else {
        format!("{name}@{version}")
    }
}
