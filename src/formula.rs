use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;
use crate::error::{ErrorKind, Result, WandError};
use crate::platform::Platform;
use crate::shell::ShellExecutor;

/// Installation strategy of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Cli,
    Gui,
    Dotfile,
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageType::Cli => "cli",
            PackageType::Gui => "gui",
            PackageType::Dotfile => "dotfile",
        })
    }
}

/// Download configuration for one (os, arch) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// URL template, see [`crate::installer::build_download_url`] for placeholders.
    pub download_url: String,
    #[serde(default)]
    pub requires_build: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_url: Option<String>,
    /// Linux desktop entry, relative to the extracted application directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_file: Option<String>,
}

/// Commands run after a CLI package is in place.
///
/// `{bin_path}` in a command is replaced with the package's `bin` directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostInstallHook {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A package definition, loaded from `<formulas>/<name>.toml`.
///
/// ```toml
/// name = "nano"
/// type = "cli"
/// description = "Small text editor"
/// homepage = "https://nano-editor.org"
/// repository = "ochairo/potions"
/// binaries = ["nano"]
///
/// [platforms.linux.amd64]
/// download_url = "https://example.com/nano-{version}-{os}-{arch}.tar.gz"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    /// GitHub `owner/repo` whose releases list the available versions.
    #[serde(default)]
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binaries: Vec<String>,
    /// Name of the `.app` bundle for macOS GUI packages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// os -> arch -> config
    #[serde(default)]
    pub platforms: BTreeMap<String, BTreeMap<String, PlatformConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_install: Option<PostInstallHook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Formula {
    pub fn new(name: &str, package_type: PackageType) -> Formula {
        Formula {
            name: name.to_string(),
            package_type,
            description: String::new(),
            homepage: String::new(),
            repository: String::new(),
            license: None,
            tags: Vec::new(),
            binaries: Vec::new(),
            app_name: None,
            platforms: BTreeMap::new(),
            post_install: None,
            dependencies: Vec::new(),
        }
    }

    pub fn platform_config(&self, platform: &Platform) -> Option<&PlatformConfig> {
        self.platforms
            .get(&platform.os)
            .and_then(|archs| archs.get(&platform.arch))
    }

    pub fn supports(&self, platform: &Platform) -> bool {
        self.platform_config(platform).is_some()
    }

    pub fn set_platform_config(&mut self, platform: &Platform, config: PlatformConfig) {
        self.platforms
            .entry(platform.os.clone())
            .or_default()
            .insert(platform.arch.clone(), config);
    }

    /// The post-install hook, if it has any commands to run.
    pub fn post_install_hook(&self) -> Option<&PostInstallHook> {
        self.post_install
            .as_ref()
            .filter(|hook| !hook.commands.is_empty())
    }

    /// Case-insensitive match on name, description and tags.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term)
            || self.description.to_lowercase().contains(&term)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(&term))
    }
}

/// Where formulas come from.
pub trait FormulaSource: Send + Sync {
    fn get_formula(&self, name: &str) -> Result<Formula>;
    fn list_formulas(&self) -> Result<Vec<Formula>>;
    /// Refreshes the local formula set from its upstream.
    fn sync(&self) -> Result<()>;
}

/// Formulas stored as one TOML file per package in a directory that is
/// (optionally) a git checkout of the formula repository.
#[derive(Debug, Clone)]
pub struct FormulaRepository {
    dir: PathBuf,
    repo_url: String,
}

impl FormulaRepository {
    pub fn new(dir: impl Into<PathBuf>, repo_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            repo_url: repo_url.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn formula_path(&self, name: &str) -> PathBuf {
        self.dir.join(name).with_extension("toml")
    }

    fn parse(path: &Path) -> Result<Formula> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WandError::wrap(
                ErrorKind::FileNotFound,
                format!("Failed to read formula {}", path.display()),
                e,
            )
        })?;
        toml::from_str(&content).map_err(|e| {
            WandError::wrap(
                ErrorKind::ConfigInvalid,
                format!("Failed to parse formula {}", path.display()),
                e,
            )
        })
    }
}

impl FormulaSource for FormulaRepository {
    fn get_formula(&self, name: &str) -> Result<Formula> {
        let path = self.formula_path(name);
        if !path.is_file() {
            return Err(WandError::with_details(
                ErrorKind::FormulaNotFound,
                "Formula not found",
                format!("package: {name:?}"),
            ));
        }
        Self::parse(&path)
    }

    fn list_formulas(&self) -> Result<Vec<Formula>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut formulas = Vec::new();
        for entry in WalkDir::new(&self.dir).into_iter().filter_entry(|e| e.file_name() != ".git") {
            let entry = entry.map_err(|e| {
                WandError::wrap(ErrorKind::DirNotFound, "Failed to walk formulas directory", e)
            })?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                formulas.push(Self::parse(path)?);
            }
        }
        formulas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(formulas)
    }

    fn sync(&self) -> Result<()> {
        let shell = ShellExecutor::default();
        if self.dir.join(".git").exists() {
            debug!(dir = %self.dir.display(), "Pulling formulas");
            shell
                .run_in("git", &["pull", "origin", "main"], &self.dir)
                .map_err(|e| WandError::wrap(ErrorKind::NetworkUnreachable, "Failed to pull formulas", e))?;
        } else {
            debug!(dir = %self.dir.display(), url = %self.repo_url, "Cloning formulas");
            if let Some(parent) = self.dir.parent() {
                crate::config::create_dir(parent)?;
            }
            let dir = self.dir.to_string_lossy().to_string();
            shell
                .run("git", &["clone", &self.repo_url, &dir])
                .map_err(|e| {
                    WandError::wrap(
                        ErrorKind::NetworkUnreachable,
                        "Failed to clone formulas repository",
                        e,
                    )
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NANO: &str = r#"
name = "nano"
type = "cli"
description = "Small and friendly text editor"
homepage = "https://www.nano-editor.org"
repository = "ochairo/potions"
tags = ["editor", "terminal"]
binaries = ["nano", "rnano"]

[platforms.linux.amd64]
download_url = "https://example.com/nano-{version}-{os}-{arch}.tar.gz"
checksum_url = "https://example.com/nano-{version}-{os}-{arch}.tar.gz.sha256"

[platforms.darwin.arm64]
download_url = "https://example.com/nano-{version}-darwin-arm64.tar.gz"
requires_build = true
build_commands = ["./configure", "make"]

[post_install]
commands = ["echo {bin_path}"]
env = { NANO_HOME = "/tmp" }
"#;

    #[test]
    fn test_parse_formula() {
        let formula: Formula = toml::from_str(NANO).unwrap();
        assert_eq!(formula.package_type, PackageType::Cli);
        assert_eq!(formula.binaries, vec!["nano", "rnano"]);
        assert_eq!(formula.post_install_hook().map(|hook| hook.commands.len()), Some(1));

        let linux = formula.platform_config(&Platform::new("linux", "x86_64")).unwrap();
        assert!(linux.checksum_url.is_some());
        assert!(!linux.requires_build);

        let mac = formula.platform_config(&Platform::new("macos", "aarch64")).unwrap();
        assert_eq!(mac.build_commands.len(), 2);

        assert!(!formula.supports(&Platform::new("linux", "arm64")));
    }

    #[test]
    fn test_empty_post_install_hook_is_ignored() {
        let mut formula = Formula::new("jq", PackageType::Cli);
        formula.post_install = Some(PostInstallHook::default());
        assert!(formula.post_install_hook().is_none());
    }

    #[test]
    fn test_matches() {
        let formula: Formula = toml::from_str(NANO).unwrap();
        assert!(formula.matches("NANO"));
        assert!(formula.matches("friendly"));
        assert!(formula.matches("termin"));
        assert!(!formula.matches("browser"));
    }

    #[test]
    fn test_repository_get_and_list() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("nano.toml"), NANO).unwrap();
        std::fs::write(
            dir.path().join("jq.toml"),
            "name = \"jq\"\ntype = \"cli\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "not a formula").unwrap();

        let repo = FormulaRepository::new(dir.path(), "unused");
        assert_eq!(repo.get_formula("nano").unwrap().name, "nano");

        let err = repo.get_formula("missing").unwrap_err();
        assert!(err.is(ErrorKind::FormulaNotFound));

        let names: Vec<String> = repo.list_formulas().unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["jq", "nano"]);
    }

    #[test]
    fn test_repository_rejects_broken_formula() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.toml"), "name = 3").unwrap();
        let repo = FormulaRepository::new(dir.path(), "unused");
        assert!(repo.get_formula("bad").unwrap_err().is(ErrorKind::ConfigInvalid));
    }
}
