use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{ErrorKind, Result, WandError};
use crate::installer::normalize_version_key;
use crate::version::Version;

pub const WANDRC_FILE: &str = ".wandrc";

/// Per-project version pins, stored as `.wandrc` in a project directory.
///
/// ```toml
/// [versions]
/// node = "20.11.0"
/// jq = "1.7.1"
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WandRc {
    /// A map of package names to pinned version strings.
    #[serde(default)]
    pub versions: BTreeMap<String, String>,
}

impl WandRc {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `.wandrc` path inside `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(WANDRC_FILE)
    }

    pub fn exists_in(dir: &Path) -> bool {
        Self::path_in(dir).is_file()
    }

    /// Loads the `.wandrc` in `dir`.
    ///
    /// # Errors
    /// [`ErrorKind::FileNotFound`] if there is none, [`ErrorKind::ConfigInvalid`]
    /// if it does not parse.
    pub fn load(dir: &Path) -> Result<WandRc> {
        let path = Self::path_in(dir);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            WandError::wrap(
                ErrorKind::FileNotFound,
                format!("Failed to read {}", path.display()),
                e,
            )
        })?;
        toml::from_str(&content).map_err(|e| {
            WandError::wrap(
                ErrorKind::ConfigInvalid,
                format!("Failed to parse {}", path.display()),
                e,
            )
        })
    }

    /// Writes the pins to `<dir>/.wandrc`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = Self::path_in(dir);
        let content = toml::to_string_pretty(self)
            .map_err(|e| WandError::wrap(ErrorKind::ConfigInvalid, "Failed to serialize .wandrc", e))?;
        std::fs::write(&path, content).map_err(|e| {
            WandError::wrap(
                ErrorKind::PermissionDenied,
                format!("Failed to write {}", path.display()),
                e,
            )
        })
    }

    /// Nearest `.wandrc` at or above `start`, with the directory it was found in.
    pub fn find_in_path(start: &Path) -> Result<Option<(WandRc, PathBuf)>> {
        for dir in start.ancestors() {
            if Self::exists_in(dir) {
                return Ok(Some((Self::load(dir)?, dir.to_path_buf())));
            }
        }
        Ok(None)
    }

    /// Pins `name` to `version`, replacing an existing pin.
    pub fn set_version(&mut self, name: &str, version: &str) -> Result<()> {
        Version::parse(version).map_err(|_| {
            WandError::new(ErrorKind::InvalidVersion, format!("Invalid version: {version:?}"))
        })?;
        self.versions
            .insert(name.to_string(), normalize_version_key(version));
        Ok(())
    }

    pub fn get_version(&self, name: &str) -> Option<&str> {
        self.versions.get(name).map(String::as_str)
    }

    /// Removes a pin, returning whether there was one.
    pub fn remove_version(&mut self, name: &str) -> bool {
        self.versions.remove(name).is_some()
    }

    pub fn has_version(&self, name: &str) -> bool {
        self.versions.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
