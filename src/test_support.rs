//! In-memory release and download sources for service tests.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use crate::config::WandPaths;
use crate::download::{DownloadError, DownloadResult, Downloader, RetryPolicy, Transport};
use crate::error::Result;
use crate::extract::Extractor;
use crate::formula::{Formula, FormulaRepository, PackageType, PlatformConfig};
use crate::installer::{build_download_url, InstallerService};
use crate::orchestrator::InstallOrchestrator;
use crate::platform::Platform;
use crate::registry::JsonRegistryStore;
use crate::releases::{Release, ReleaseSource};
use crate::resolver::VersionService;
use crate::version::Version;

#[derive(Default)]
pub(crate) struct StaticReleases {
    tags: Mutex<HashMap<String, Vec<String>>>,
}

impl StaticReleases {
    pub(crate) fn publish(&self, repository: &str, tag: &str) {
        self.tags
            .lock()
            .unwrap()
            .entry(repository.to_string())
            .or_default()
            .push(tag.to_string());
    }
}

impl ReleaseSource for StaticReleases {
    fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let tags = self.tags.lock().unwrap();
        Ok(tags
            .get(&format!("{owner}/{repo}"))
            .map(|tags| tags.iter().map(Release::new).collect())
            .unwrap_or_default())
    }
}

/// Serves registered bodies, 404 for everything else.
#[derive(Default)]
pub(crate) struct StaticTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
}

impl StaticTransport {
    pub(crate) fn serve(&self, url: &str, body: &[u8]) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.to_vec());
    }
}

impl Transport for StaticTransport {
    fn get(&self, url: &str, out: &mut dyn Write) -> DownloadResult<u64> {
        let bodies = self.bodies.lock().unwrap();
        let body = bodies.get(url).ok_or(DownloadError::Status(404))?;
        out.write_all(body)?;
        Ok(body.len() as u64)
    }
}

/// Gzipped tarball of `(path, contents)` pairs.
pub(crate) fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A throwaway wand home with a formula directory, fake release list and
/// fake download server.
pub(crate) struct TestEnv {
    _root: TempDir,
    pub(crate) paths: WandPaths,
    pub(crate) platform: Platform,
    pub(crate) project: PathBuf,
    pub(crate) releases: Arc<StaticReleases>,
    pub(crate) transport: Arc<StaticTransport>,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let paths = WandPaths::new(root.path().join("home"), root.path().join("home/.wand"));
        paths.ensure_dirs().unwrap();
        let project = root.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        Self {
            _root: root,
            paths,
            platform: Platform::new("linux", "amd64"),
            project,
            releases: Arc::new(StaticReleases::default()),
            transport: Arc::new(StaticTransport::default()),
        }
    }

    pub(crate) fn add_formula(&self, formula: &Formula) {
        std::fs::write(
            self.paths.formulas_dir().join(format!("{}.toml", formula.name)),
            toml::to_string(formula).unwrap(),
        )
        .unwrap();
    }

    /// Publishes `tag` for `formula` and serves `body` at its download URL.
    pub(crate) fn release(&self, formula: &Formula, tag: &str, body: &[u8]) {
        self.releases.publish(&formula.repository, tag);
        let template = &formula.platform_config(&self.platform).unwrap().download_url;
        let url = build_download_url(template, &Version::parse(tag).unwrap(), &self.platform);
        self.transport.serve(&url, body);
    }

    /// A CLI formula whose download is a single file.
    pub(crate) fn cli_formula(&self, name: &str, binaries: &[&str]) -> Formula {
        let mut formula = Formula::new(name, PackageType::Cli);
        formula.repository = format!("acme/{name}");
        formula.description = format!("{name} for tests");
        formula.binaries = binaries.iter().map(|b| b.to_string()).collect();
        formula.set_platform_config(
            &self.platform,
            PlatformConfig {
                download_url: format!("https://dl.test/{name}/{{version}}/{name}-{{os}}-{{arch}}"),
                ..PlatformConfig::default()
            },
        );
        formula
    }

    /// Writes a CLI formula whose download is a single shell script and
    /// publishes `tags` as releases.
    pub(crate) fn cli_package(&self, name: &str, binaries: &[&str], tags: &[&str]) {
        let formula = self.cli_formula(name, binaries);
        self.add_formula(&formula);
        for tag in tags {
            let version = Version::parse(tag).unwrap();
            self.release(&formula, tag, format!("#!/bin/sh\necho {name} {version}\n").as_bytes());
        }
    }

    pub(crate) fn installer(&self) -> InstallerService {
        let formulas = Arc::new(FormulaRepository::new(self.paths.formulas_dir(), "unused"));
        InstallerService::new(
            self.paths.clone(),
            self.platform.clone(),
            Arc::new(JsonRegistryStore::new(self.paths.registry_file())),
            VersionService::new(formulas, self.releases.clone()),
            Downloader::new(self.transport.clone()).with_policy(RetryPolicy::immediate(1)),
            Extractor::new(),
        )
    }

    pub(crate) fn orchestrator(&self) -> InstallOrchestrator {
        InstallOrchestrator::from_parts(
            self.paths.clone(),
            self.platform.clone(),
            Arc::new(FormulaRepository::new(self.paths.formulas_dir(), "unused")),
            self.releases.clone(),
            Arc::new(JsonRegistryStore::new(self.paths.registry_file())),
            Downloader::new(self.transport.clone()).with_policy(RetryPolicy::immediate(1)),
            "/usr/local/bin/wand",
        )
    }
}
