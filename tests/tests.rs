use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use wand::download::sha256_file;
use wand::installer::build_download_url;
use wand::{
    Downloader, ErrorKind, Formula, FormulaRepository, InstallOrchestrator, JsonRegistryStore,
    PackageType, Platform, PlatformConfig, Registry, RegistryStore, Release, ReleaseSource,
    DownloadError, RetryPolicy, Transport, Version, WandPaths,
};

const TEMPLATE: &str = "https://dl.test/hello/{version}/hello-{os}-{arch}.tar.gz";
const CHECKSUM_TEMPLATE: &str = "https://dl.test/hello/{version}/SHA256SUMS";

#[derive(Default)]
struct FakeServer {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
}

impl Transport for FakeServer {
    fn get(&self, url: &str, out: &mut dyn Write) -> Result<u64, DownloadError> {
        let bodies = self.bodies.lock().unwrap();
        let body = bodies.get(url).ok_or(DownloadError::Status(404))?;
        out.write_all(body)?;
        Ok(body.len() as u64)
    }
}

struct FakeReleases(Vec<&'static str>);

impl ReleaseSource for FakeReleases {
    fn list_releases(&self, owner: &str, repo: &str) -> wand::Result<Vec<Release>> {
        assert_eq!((owner, repo), ("acme", "hello"));
        Ok(self.0.iter().map(|tag| Release::new(*tag)).collect())
    }
}

struct Setup {
    _root: TempDir,
    paths: WandPaths,
    platform: Platform,
    server: Arc<FakeServer>,
}

impl Setup {
    fn new(with_checksum: bool) -> Self {
        let root = tempfile::tempdir().unwrap();
        let paths = WandPaths::new(root.path(), root.path().join(".wand"));
        paths.ensure_dirs().unwrap();
        let platform = Platform::new("linux", "amd64");

        let mut formula = Formula::new("hello", PackageType::Cli);
        formula.repository = "acme/hello".into();
        formula.binaries = vec!["hello".into()];
        formula.set_platform_config(
            &platform,
            PlatformConfig {
                download_url: TEMPLATE.into(),
                checksum_url: with_checksum.then(|| CHECKSUM_TEMPLATE.to_string()),
                ..PlatformConfig::default()
            },
        );
        fs::write(
            paths.formulas_dir().join("hello.toml"),
            toml::to_string(&formula).unwrap(),
        )
        .unwrap();

        Setup {
            _root: root,
            paths,
            platform,
            server: Arc::new(FakeServer::default()),
        }
    }

    fn url(&self, template: &str, version: &str) -> String {
        build_download_url(template, &Version::parse(version).unwrap(), &self.platform)
    }

    fn serve(&self, url: String, body: Vec<u8>) {
        self.server.bodies.lock().unwrap().insert(url, body);
    }

    /// Publishes `hello-<version>/bin/hello` as a tar.gz.
    fn publish(&self, version: &str) {
        let tarball = tarball(&[(
            format!("hello-{version}/bin/hello"),
            format!("#!/bin/sh\necho hello {version}\n").into_bytes(),
        )]);
        self.serve(self.url(TEMPLATE, version), tarball);
    }

    fn wand(&self, tags: Vec<&'static str>) -> InstallOrchestrator {
        InstallOrchestrator::from_parts(
            self.paths.clone(),
            self.platform.clone(),
            Arc::new(FormulaRepository::new(self.paths.formulas_dir(), "unused")),
            Arc::new(FakeReleases(tags)),
            Arc::new(JsonRegistryStore::new(self.paths.registry_file())),
            Downloader::new(self.server.clone()).with_policy(RetryPolicy::immediate(3)),
            "/usr/local/bin/wand",
        )
    }

    fn registry(&self) -> Registry {
        JsonRegistryStore::new(self.paths.registry_file()).load().unwrap()
    }
}

fn tarball(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        let raw = name.as_bytes();
        header.as_old_mut().name[..raw.len()].copy_from_slice(raw);
        header.set_cksum();
        builder.append(&header, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

#[test]
fn test_install_then_uninstall_restores_state() {
    let setup = Setup::new(false);
    setup.publish("1.0.0");
    let wand = setup.wand(vec!["hello-1.0.0"]);
    let before = setup.registry();

    let package = wand.install_package("hello", "1.0.0").unwrap();
    let install_dir = setup.paths.package_dir("hello", "1.0.0");
    assert_eq!(package.install_path, install_dir);
    assert_eq!(package.bin_path, install_dir.join("hello-1.0.0/bin"));
    assert!(package.bin_path.join("hello").is_file());
    assert!(package.is_global);
    assert!(wand.shims().shim_path("hello").exists());
    assert!(is_empty_dir(&setup.paths.tmp_dir()));

    wand.uninstall_package("hello", Some("1.0.0")).unwrap();
    let after = setup.registry();
    assert_eq!(after.packages, before.packages);
    assert_eq!(after.global_versions, before.global_versions);
    assert!(is_empty_dir(&setup.paths.packages_dir()));
    assert!(is_empty_dir(&setup.paths.shims_dir()));
}

#[test]
fn test_reinstall_same_version_leaves_registry_untouched() {
    let setup = Setup::new(false);
    setup.publish("1.0.0");
    let wand = setup.wand(vec!["hello-1.0.0"]);
    wand.install_package("hello", "").unwrap();
    let snapshot = fs::read(setup.paths.registry_file()).unwrap();

    let err = wand.install_package("hello", "1.0.0").unwrap_err();
    assert!(err.is(ErrorKind::PackageInstalled));
    assert_eq!(fs::read(setup.paths.registry_file()).unwrap(), snapshot);
}

#[test]
fn test_uninstall_all_clears_global() {
    let setup = Setup::new(false);
    setup.publish("1.0.0");
    setup.publish("1.1.0");
    let wand = setup.wand(vec!["hello-1.1.0", "hello-1.0.0", "nightly"]);
    wand.install_package("hello", "1.0.0").unwrap();
    wand.install_package("hello", "latest").unwrap();
    assert_eq!(setup.registry().global_version("hello"), Some("1.0.0"));

    let removed = wand.uninstall_package("hello", None).unwrap();
    assert_eq!(removed.len(), 2);
    let registry = setup.registry();
    assert!(!registry.has_package("hello"));
    assert_eq!(registry.global_version("hello"), None);
}

#[test]
fn test_unknown_version_is_rejected() {
    let setup = Setup::new(false);
    let wand = setup.wand(vec!["hello-1.0.0"]);
    let err = wand.install_package("hello", "9.9.9").unwrap_err();
    assert!(err.is(ErrorKind::VersionNotFound));
}

#[test]
fn test_checksum_verification() {
    let setup = Setup::new(true);
    setup.publish("1.0.0");
    let wand = setup.wand(vec!["1.0.0"]);
    setup.serve(setup.url(CHECKSUM_TEMPLATE, "1.0.0"), b"deadbeef  hello.tar.gz\n".to_vec());

    let err = wand.install_package("hello", "1.0.0").unwrap_err();
    assert!(err.is(ErrorKind::ChecksumMismatch));
    assert!(!setup.registry().has_package("hello"));
    assert!(is_empty_dir(&setup.paths.tmp_dir()));

    let archive = setup.paths.wand_dir.join("archive.tar.gz");
    fs::write(&archive, setup.server.bodies.lock().unwrap()[&setup.url(TEMPLATE, "1.0.0")].clone()).unwrap();
    let digest = sha256_file(&archive).unwrap().to_uppercase();
    setup.serve(setup.url(CHECKSUM_TEMPLATE, "1.0.0"), format!("{digest}  hello.tar.gz\n").into_bytes());
    wand.install_package("hello", "1.0.0").unwrap();
}

#[test]
fn test_traversal_archive_fails_install() {
    let setup = Setup::new(false);
    let evil = tarball(&[("../../evil".to_string(), b"owned".to_vec())]);
    setup.serve(setup.url(TEMPLATE, "1.0.0"), evil);
    let wand = setup.wand(vec!["1.0.0"]);

    let err = wand.install_package("hello", "1.0.0").unwrap_err();
    assert!(err.is(ErrorKind::InvalidPath));
    assert!(!setup.registry().has_package("hello"));
    assert!(!setup.paths.packages_dir().join("evil").exists());
    assert!(!setup.paths.wand_dir.join("evil").exists());
}

#[test]
fn test_missing_download_is_not_retried_into_success() {
    let setup = Setup::new(false);
    let wand = setup.wand(vec!["1.0.0"]);
    let err = wand.install_package("hello", "1.0.0").unwrap_err();
    assert!(err.is(ErrorKind::HttpError));
}
