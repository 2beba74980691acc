use std::path::{Path, PathBuf};
use directories::BaseDirs;
use crate::error::{ErrorKind, Result, WandError};

/// Environment variable overriding the wand directory (default `~/.wand`).
pub const WAND_HOME_ENV: &str = "WAND_HOME";
/// Environment variable overriding the formula repository used by `sync`.
pub const FORMULAS_REPO_ENV: &str = "WAND_FORMULAS_REPO";
pub const DEFAULT_FORMULAS_REPO: &str = "https://github.com/ochairo/potions.git";

pub const REGISTRY_FILE: &str = "registry.json";

/// Every location wand reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WandPaths {
    /// The user's home directory. GUI integration writes below it.
    pub home_dir: PathBuf,
    /// Root of wand's own state, `~/.wand` unless overridden.
    pub wand_dir: PathBuf,
}

impl WandPaths {
    pub fn new(home_dir: impl Into<PathBuf>, wand_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            wand_dir: wand_dir.into(),
        }
    }

    /// Resolves paths from the environment: `WAND_HOME` if set, otherwise
    /// `<home>/.wand`.
    pub fn from_env() -> Result<Self> {
        let base = BaseDirs::new().ok_or_else(|| {
            WandError::new(ErrorKind::ConfigMissing, "Could not determine home directory")
        })?;
        let home_dir = base.home_dir().to_path_buf();
        let wand_dir = match std::env::var_os(WAND_HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => home_dir.join(".wand"),
        };
        Ok(Self { home_dir, wand_dir })
    }

    pub fn formulas_dir(&self) -> PathBuf {
        self.wand_dir.join("formulas")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.wand_dir.join("packages")
    }

    /// `packages/<name>/<version>`
    pub fn package_dir(&self, name: &str, version: &str) -> PathBuf {
        self.packages_dir().join(name).join(version)
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.wand_dir.join("apps")
    }

    pub fn shims_dir(&self) -> PathBuf {
        self.wand_dir.join("shims")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.wand_dir.join("tmp")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.wand_dir.join(REGISTRY_FILE)
    }

    /// Creates the wand directory layout if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.wand_dir.clone(),
            self.formulas_dir(),
            self.packages_dir(),
            self.shims_dir(),
            self.tmp_dir(),
        ] {
            create_dir(&dir)?;
        }
        Ok(())
    }
}

/// The formula repository URL used by `sync`.
pub fn formulas_repo_url() -> String {
    std::env::var(FORMULAS_REPO_ENV)
        .ok()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_FORMULAS_REPO.to_string())
}

/// A GitHub token from `GITHUB_TOKEN` or `GH_TOKEN`, if any.
pub fn github_token() -> Option<String> {
    ["GITHUB_TOKEN", "GH_TOKEN"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|token| !token.is_empty()))
}

pub(crate) fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        WandError::wrap(
            ErrorKind::PermissionDenied,
            format!("Failed to create directory {}", dir.display()),
            e,
        )
    })
}
