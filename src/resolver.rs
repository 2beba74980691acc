use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;
use crate::constraint::Constraint;
use crate::error::{ErrorKind, Result, WandError};
use crate::formula::{Formula, FormulaSource};
use crate::releases::{split_repository, ReleaseSource};
use crate::version::Version;

/// Turns user supplied version strings into concrete versions, using the
/// release list of the formula's repository as the source of truth.
///
/// Nothing is cached: every call asks the release source again.
#[derive(Clone)]
pub struct VersionService {
    formulas: Arc<dyn FormulaSource>,
    releases: Arc<dyn ReleaseSource>,
}

impl VersionService {
    pub fn new(formulas: Arc<dyn FormulaSource>, releases: Arc<dyn ReleaseSource>) -> Self {
        Self { formulas, releases }
    }

    pub fn formula(&self, name: &str) -> Result<Formula> {
        self.formulas.get_formula(name).map_err(|e| {
            if e.is(ErrorKind::FormulaNotFound) {
                WandError::package_not_found(name)
            } else {
                e
            }
        })
    }

    /// All released versions of `name`, newest first.
    ///
    /// Tags may carry a `<name>-` prefix (`nano-8.7` is `8.7.0`); tags that do
    /// not parse as versions are skipped.
    pub fn list_available_versions(&self, name: &str) -> Result<Vec<Version>> {
        let formula = self.formula(name)?;
        let (owner, repo) = split_repository(&formula.repository)?;
        let releases = self.releases.list_releases(owner, repo).map_err(|e| {
            WandError::wrap(
                ErrorKind::NetworkUnreachable,
                format!("Failed to fetch releases for {name}"),
                e,
            )
        })?;

        let prefix = format!("{name}-");
        let mut versions: Vec<Version> = releases
            .iter()
            .filter_map(|release| {
                let tag = release.tag_name.strip_prefix(&prefix).unwrap_or(&release.tag_name);
                Version::parse(tag).ok()
            })
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();
        debug!(package = name, count = versions.len(), "Available versions");
        Ok(versions)
    }

    pub fn latest_version(&self, name: &str) -> Result<Version> {
        self.list_available_versions(name)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                WandError::with_details(
                    ErrorKind::VersionNotFound,
                    "No versions found",
                    format!("package: {name:?}"),
                )
            })
    }

    pub fn version_exists(&self, name: &str, version: &Version) -> Result<bool> {
        Ok(self.list_available_versions(name)?.contains(version))
    }

    /// `""` and `"latest"` resolve to the newest release; anything else must be
    /// an exact version that exists upstream.
    pub fn resolve_version(&self, name: &str, version: &str) -> Result<Version> {
        if version.is_empty() || version == "latest" {
            return self.latest_version(name);
        }
        let parsed = Version::parse(version).map_err(|_| {
            WandError::new(ErrorKind::InvalidVersion, format!("Invalid version: {version:?}"))
        })?;
        if !self.version_exists(name, &parsed)? {
            return Err(WandError::version_not_found(name, version));
        }
        Ok(parsed)
    }

    /// Resolves a constraint such as `^1.2.0`, `~1.2`, `>=2`, `1.x` against
    /// the release list. See [`Constraint`] for the grammar.
    pub fn find_best_match(&self, name: &str, constraint: &str) -> Result<Version> {
        let parsed = Constraint::parse(constraint)?;
        let versions = self.list_available_versions(name)?;
        parsed
            .select(&versions)
            .cloned()
            .ok_or_else(|| WandError::version_not_found(name, constraint))
    }

    pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
        Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
    }
}
