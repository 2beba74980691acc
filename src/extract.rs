//! Archive extraction.
//!
//! Every entry is checked before it is written: its path must stay inside the
//! destination directory and its declared size must not exceed the configured
//! limit. Copies read through a capped reader regardless of the declared size.
//!
//! Entries are also checked against the filesystem as it stands, so a symlink
//! unpacked by an earlier entry cannot carry a later file, directory or link
//! outside the destination.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use thiserror::Error;
use tracing::{debug, trace};
use zip::ZipArchive;
use crate::error::ErrorKind;

/// Largest single entry accepted by default: 500 MB.
pub const MAX_ENTRY_SIZE: u64 = 500 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("path traversal detected: {entry} is outside {dest}")]
    PathTraversal { entry: String, dest: String },
    #[error("archive entry {entry} is too large: {size} bytes (max {max})")]
    EntryTooLarge { entry: String, size: u64, max: u64 },
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("disk image: {0}")]
    DiskImage(String),
    #[error("disk images can only be extracted on macOS")]
    DiskImageUnsupported,
}

impl ExtractError {
    /// Domain kind the installer reports this failure under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::PathTraversal { .. } => ErrorKind::InvalidPath,
            ExtractError::DiskImageUnsupported => ErrorKind::SystemNotSupported,
            _ => ErrorKind::ExtractionFailed,
        }
    }
}

pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

fn io_error(context: impl Into<String>) -> impl FnOnce(io::Error) -> ExtractError {
    let context = context.into();
    move |source| ExtractError::Io { context, source }
}

/// Whether the installer should unpack `file_name` rather than treat it as a raw binary.
pub fn is_archive(file_name: &str) -> bool {
    ArchiveFormat::from_path(Path::new(file_name)).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarBz2,
    Zip,
    Dmg,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<ArchiveFormat> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(ArchiveFormat::TarBz2)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".dmg") {
            Some(ArchiveFormat::Dmg)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    max_entry_size: u64,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            max_entry_size: MAX_ENTRY_SIZE,
        }
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entry_size(max_entry_size: u64) -> Self {
        Self { max_entry_size }
    }

    /// Unpacks `archive` into `dest`, choosing the format from the file name.
    pub fn extract(&self, archive: &Path, dest: &Path) -> ExtractResult<()> {
        let format = ArchiveFormat::from_path(archive)
            .ok_or_else(|| ExtractError::UnsupportedFormat(archive.display().to_string()))?;
        create_private_dir(dest)?;
        let root = dest
            .canonicalize()
            .map_err(io_error(format!("Failed to resolve {}", dest.display())))?;
        debug!(archive = %archive.display(), dest = %root.display(), ?format, "Extracting");

        match format {
            ArchiveFormat::Tar => self.extract_tar(open(archive)?, &root),
            ArchiveFormat::TarGz => self.extract_tar(GzDecoder::new(open(archive)?), &root),
            ArchiveFormat::TarBz2 => self.extract_tar(BzDecoder::new(open(archive)?), &root),
            ArchiveFormat::Zip => self.extract_zip(archive, &root),
            ArchiveFormat::Dmg => self.extract_dmg(archive, &root),
        }
    }

    fn check_size(&self, entry: &str, size: u64) -> ExtractResult<()> {
        if size > self.max_entry_size {
            return Err(ExtractError::EntryTooLarge {
                entry: entry.to_string(),
                size,
                max: self.max_entry_size,
            });
        }
        Ok(())
    }

    fn extract_tar<R: Read>(&self, reader: R, root: &Path) -> ExtractResult<()> {
        let mut archive = Archive::new(reader);
        let entries = archive
            .entries()
            .map_err(io_error("Failed to read tar archive"))?;

        for entry in entries {
            let mut entry = entry.map_err(io_error("Failed to read tar entry"))?;
            let name = entry
                .path()
                .map_err(io_error("Invalid tar entry path"))?
                .into_owned();
            let entry_name = name.display().to_string();
            self.check_size(&entry_name, entry.size())?;
            let target = safe_join(root, &name)?;
            trace!(entry = %entry_name, "Tar entry");

            match entry.header().entry_type() {
                EntryType::Directory => create_entry_dir(root, &target)?,
                EntryType::Regular | EntryType::Continuous => {
                    let mode = entry.header().mode().unwrap_or(0o644);
                    self.write_file(&mut entry, root, &target, mode)?;
                }
                EntryType::Symlink => {
                    let link = entry
                        .link_name()
                        .map_err(io_error(format!("Invalid symlink target for {entry_name}")))?
                        .ok_or_else(|| ExtractError::Io {
                            context: format!("Symlink {entry_name} has no target"),
                            source: io::Error::from(io::ErrorKind::InvalidData),
                        })?;
                    make_symlink(root, &link, &target)?;
                }
                other => trace!(entry = %entry_name, ?other, "Skipping tar entry"),
            }
        }
        Ok(())
    }

    fn extract_zip(&self, archive: &Path, root: &Path) -> ExtractResult<()> {
        let mut zip = ZipArchive::new(open(archive)?)?;

        for index in 0..zip.len() {
            let mut file = zip.by_index(index)?;
            let name = file.name().to_string();
            let target = safe_join(root, Path::new(&name))?;
            trace!(entry = %name, "Zip entry");

            if file.is_dir() {
                create_entry_dir(root, &target)?;
                continue;
            }
            self.check_size(&name, file.size())?;
            let mode = file.unix_mode().unwrap_or(0o644);
            self.write_file(&mut file, root, &target, mode)?;
        }
        Ok(())
    }

    fn write_file<R: Read>(&self, reader: &mut R, root: &Path, target: &Path, mode: u32) -> ExtractResult<()> {
        prepare_parent(root, target)?;
        clear_entry(target)?;

        let mut out = create_file(target, mode)
            .map_err(io_error(format!("Failed to create {}", target.display())))?;
        io::copy(&mut reader.take(self.max_entry_size), &mut out)
            .map_err(io_error(format!("Failed to write {}", target.display())))?;
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn extract_dmg(&self, archive: &Path, root: &Path) -> ExtractResult<()> {
        use crate::shell::ShellExecutor;
        use walkdir::WalkDir;

        let mount = tempfile::Builder::new()
            .prefix("wand-dmg-")
            .tempdir()
            .map_err(io_error("Failed to create mount point"))?;
        let mount_path = mount.path().to_string_lossy().to_string();
        let image = archive.to_string_lossy().to_string();
        let shell = ShellExecutor::default();

        shell
            .run("hdiutil", &["attach", "-nobrowse", "-mountpoint", &mount_path, &image])
            .map_err(|e| ExtractError::DiskImage(e.to_string()))?;
        let copied = (|| -> ExtractResult<()> {
            let entries = fs::read_dir(mount.path()).map_err(io_error("Failed to read mounted image"))?;
            for entry in entries.flatten() {
                if !entry.file_name().to_string_lossy().ends_with(".app") {
                    continue;
                }
                for item in WalkDir::new(entry.path()) {
                    let item = item.map_err(|e| ExtractError::Io {
                        context: "Failed to walk app bundle".to_string(),
                        source: io::Error::from(e),
                    })?;
                    let rel = item
                        .path()
                        .strip_prefix(mount.path())
                        .map_err(|e| ExtractError::DiskImage(e.to_string()))?;
                    let target = safe_join(root, rel)?;
                    if item.file_type().is_dir() {
                        create_entry_dir(root, &target)?;
                    } else if item.file_type().is_symlink() {
                        let link = fs::read_link(item.path()).map_err(io_error("Failed to read symlink"))?;
                        make_symlink(root, &link, &target)?;
                    } else {
                        let mut src = open(item.path())?;
                        let size = item.metadata().map(|m| m.len()).unwrap_or(0);
                        self.check_size(&rel.display().to_string(), size)?;
                        self.write_file(&mut src, root, &target, 0o755)?;
                    }
                }
                return Ok(());
            }
            Err(ExtractError::DiskImage("no .app bundle found".to_string()))
        })();
        let detached = shell
            .run("hdiutil", &["detach", &mount_path])
            .map_err(|e| ExtractError::DiskImage(e.to_string()));
        copied?;
        detached.map(|_| ())
    }

    #[cfg(not(target_os = "macos"))]
    fn extract_dmg(&self, _archive: &Path, _root: &Path) -> ExtractResult<()> {
        Err(ExtractError::DiskImageUnsupported)
    }
}

/// Joins an archive entry name onto `dest` lexically and rejects anything that
/// would land outside it. Absolute entry names are rejected outright.
pub fn safe_join(dest: &Path, entry: &Path) -> ExtractResult<PathBuf> {
    let traversal = || traversal(entry, dest);

    let mut target = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !target.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }
    if !target.starts_with(dest) {
        return Err(traversal());
    }
    Ok(target)
}

fn traversal(entry: &Path, dest: &Path) -> ExtractError {
    ExtractError::PathTraversal {
        entry: entry.display().to_string(),
        dest: dest.display().to_string(),
    }
}

/// Fails unless the deepest existing ancestor of `path` (the path itself
/// included) resolves inside `root`. `root` must already be canonical.
fn ensure_inside(root: &Path, path: &Path) -> ExtractResult<()> {
    let existing = path
        .ancestors()
        .find(|p| fs::symlink_metadata(p).is_ok())
        .unwrap_or(root);
    let resolved = existing
        .canonicalize()
        .map_err(io_error(format!("Failed to resolve {}", existing.display())))?;
    if !resolved.starts_with(root) {
        return Err(traversal(path, root));
    }
    Ok(())
}

fn create_entry_dir(root: &Path, dir: &Path) -> ExtractResult<()> {
    ensure_inside(root, dir)?;
    create_private_dir(dir)
}

fn prepare_parent(root: &Path, target: &Path) -> ExtractResult<()> {
    match target.parent() {
        Some(parent) => create_entry_dir(root, parent),
        None => Ok(()),
    }
}

/// Removes a file or symlink left at `path` by an earlier entry.
fn clear_entry(path: &Path) -> ExtractResult<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            fs::remove_file(path).map_err(io_error(format!("Failed to replace {}", path.display())))
        }
        _ => Ok(()),
    }
}

fn open(path: &Path) -> ExtractResult<File> {
    File::open(path).map_err(io_error(format!("Failed to open {}", path.display())))
}

fn create_private_dir(dir: &Path) -> ExtractResult<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(io_error(format!("Failed to create {}", dir.display())))
}

/// `create_new` refuses to open through a symlink that appeared after `clear_entry`.
fn create_file(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & 0o777);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

fn make_symlink(root: &Path, link: &Path, target: &Path) -> ExtractResult<()> {
    prepare_parent(root, target)?;
    clear_entry(target)?;
    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(link, target);
    #[cfg(windows)]
    let created = std::os::windows::fs::symlink_file(link, target);
    created.map_err(io_error(format!("Failed to create symlink {}", target.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::{Builder, Header};
    use tempfile::TempDir;

    enum Item<'a> {
        File(&'a str, &'a [u8]),
        Dir(&'a str),
        Link(&'a str, &'a str),
        /// Written without `set_path` validation.
        Raw(&'a str, &'a [u8]),
    }

    fn tarball(dir: &Path, name: &str, items: &[Item]) -> PathBuf {
        let path = dir.join(name);
        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut builder = Builder::new(encoder);

        for item in items {
            let mut header = Header::new_gnu();
            match item {
                Item::File(p, content) => {
                    header.set_path(p).unwrap();
                    header.set_size(content.len() as u64);
                    header.set_mode(0o755);
                    header.set_cksum();
                    builder.append(&header, *content).unwrap();
                }
                Item::Dir(p) => {
                    header.set_path(p).unwrap();
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_cksum();
                    builder.append(&header, io::empty()).unwrap();
                }
                Item::Link(p, to) => {
                    header.set_path(p).unwrap();
                    header.set_entry_type(EntryType::Symlink);
                    header.set_link_name(to).unwrap();
                    header.set_size(0);
                    header.set_cksum();
                    builder.append(&header, io::empty()).unwrap();
                }
                Item::Raw(p, content) => {
                    let name = &mut header.as_old_mut().name;
                    name[..p.len()].copy_from_slice(p.as_bytes());
                    header.set_size(content.len() as u64);
                    header.set_mode(0o644);
                    header.set_entry_type(EntryType::Regular);
                    header.set_cksum();
                    builder.append(&header, *content).unwrap();
                }
            }
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive("nano-8.7.tar.gz"));
        assert!(is_archive("tool.TGZ"));
        assert!(is_archive("tool.zip"));
        assert!(is_archive("App.dmg"));
        assert!(!is_archive("jq-linux-amd64"));
        assert!(!is_archive("tool.tar.xz"));
        assert!(!is_archive("jq.gz"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tar.gz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tgz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tar.bz2")), Some(ArchiveFormat::TarBz2));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tar")), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.dmg")), Some(ArchiveFormat::Dmg));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tar.xz")), None);
    }

    #[test]
    fn test_safe_join() {
        let dest = Path::new("/wand/tmp/x");
        assert_eq!(safe_join(dest, Path::new("bin/nano")).unwrap(), dest.join("bin/nano"));
        assert_eq!(safe_join(dest, Path::new("./a/../b")).unwrap(), dest.join("b"));
        assert!(safe_join(dest, Path::new("../../etc/passwd")).is_err());
        assert!(safe_join(dest, Path::new("a/../../y")).is_err());
        assert_eq!(safe_join(dest, Path::new("./")).unwrap(), dest);
        assert!(safe_join(dest, Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = tarball(
            temp.path(),
            "tool.tar.gz",
            &[
                Item::Dir("tool-1.0/"),
                Item::Dir("tool-1.0/bin/"),
                Item::File("tool-1.0/bin/tool", b"#!/bin/sh\necho tool\n"),
                Item::File("tool-1.0/README", b"readme"),
            ],
        );
        let dest = temp.path().join("out");
        Extractor::new().extract(&archive, &dest).unwrap();

        let bin = dest.join("tool-1.0/bin/tool");
        assert_eq!(fs::read_to_string(&bin).unwrap(), "#!/bin/sh\necho tool\n");
        assert_eq!(fs::read_to_string(dest.join("tool-1.0/README")).unwrap(), "readme");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir_mode = fs::metadata(dest.join("tool-1.0/bin")).unwrap().permissions().mode();
            assert_eq!(dir_mode & 0o777, 0o700);
            let bin_mode = fs::metadata(&bin).unwrap().permissions().mode();
            assert_ne!(bin_mode & 0o111, 0);
        }
    }

    #[test]
    fn test_rejects_path_traversal() {
        let temp = TempDir::new().unwrap();
        let archive = tarball(
            temp.path(),
            "evil.tar.gz",
            &[Item::Raw("../../etc/passwd", b"root::0:0::/:/bin/sh\n")],
        );
        let dest = temp.path().join("a").join("b").join("out");
        let err = Extractor::new().extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, ExtractError::PathTraversal { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
        assert!(!temp.path().join("a/etc/passwd").exists());
        assert!(!temp.path().join("etc/passwd").exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_oversized_entry() {
        let temp = TempDir::new().unwrap();
        let archive = tarball(temp.path(), "big.tar.gz", &[Item::File("big.bin", &[7u8; 64])]);
        let dest = temp.path().join("out");
        let err = Extractor::with_max_entry_size(16).extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, ExtractError::EntryTooLarge { size: 64, max: 16, .. }));
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
        assert!(!dest.join("big.bin").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_recreates_symlinks() {
        let temp = TempDir::new().unwrap();
        let archive = tarball(
            temp.path(),
            "links.tar.gz",
            &[
                Item::File("bin/tool-1.0", b"binary"),
                Item::Link("bin/tool", "tool-1.0"),
            ],
        );
        let dest = temp.path().join("out");
        Extractor::new().extract(&archive, &dest).unwrap();

        let link = dest.join("bin/tool");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("tool-1.0"));
        assert_eq!(fs::read_to_string(&link).unwrap(), "binary");
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_write_through_escaping_symlink() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let archive = tarball(
            temp.path(),
            "sneaky.tar.gz",
            &[
                Item::Link("escape", outside.to_str().unwrap()),
                Item::File("escape/owned", b"gotcha"),
            ],
        );
        let err = Extractor::new().extract(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));
        assert!(!outside.join("owned").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_entry_replaces_earlier_symlink() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside.txt");
        let archive = tarball(
            temp.path(),
            "swap.tar.gz",
            &[
                Item::Link("x", outside.to_str().unwrap()),
                Item::File("x", b"pwned!"),
            ],
        );
        let dest = temp.path().join("out");
        Extractor::new().extract(&archive, &dest).unwrap();

        assert!(!outside.exists());
        let written = dest.join("x");
        assert!(!fs::symlink_metadata(&written).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(&written).unwrap(), b"pwned!");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_entry_does_not_overwrite_through_symlink() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside.txt");
        fs::write(&outside, b"original").unwrap();
        let archive = tarball(
            temp.path(),
            "swap.tar.gz",
            &[
                Item::Link("x", outside.to_str().unwrap()),
                Item::File("x", b"pwned!"),
            ],
        );
        Extractor::new().extract(&archive, &temp.path().join("out")).unwrap();
        assert_eq!(fs::read(&outside).unwrap(), b"original");
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_directory_through_escaping_symlink() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let archive = tarball(
            temp.path(),
            "dirs.tar.gz",
            &[
                Item::Link("esc", outside.to_str().unwrap()),
                Item::Dir("esc/newdir/"),
            ],
        );
        let err = Extractor::new().extract(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));
        assert!(!outside.join("newdir").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_through_escaping_symlink() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let archive = tarball(
            temp.path(),
            "links.tar.gz",
            &[
                Item::Link("esc", outside.to_str().unwrap()),
                Item::Link("esc/deeper/inner", "/etc"),
            ],
        );
        let err = Extractor::new().extract(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));
        assert!(fs::read_dir(&outside).unwrap().next().is_none());
    }

    #[test]
    fn test_extract_tar_bz2() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tool.tar.bz2");
        let encoder = bzip2::write::BzEncoder::new(File::create(&path).unwrap(), bzip2::Compression::default());
        let mut builder = Builder::new(encoder);
        let mut header = Header::new_gnu();
        header.set_path("tool").unwrap();
        header.set_size(4);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, &b"bz2!"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = temp.path().join("out");
        Extractor::new().extract(&path, &dest).unwrap();
        assert_eq!(fs::read(dest.join("tool")).unwrap(), b"bz2!");
    }

    fn zipball(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("tool.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_extract_zip() {
        let temp = TempDir::new().unwrap();
        let archive = zipball(temp.path(), &[("app/", b""), ("app/bin/tool", b"zipped")]);
        let dest = temp.path().join("out");
        Extractor::new().extract(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join("app/bin/tool")).unwrap(), b"zipped");
    }

    #[test]
    fn test_zip_rejects_oversized_entry() {
        let temp = TempDir::new().unwrap();
        let archive = zipball(temp.path(), &[("big", &[1u8; 128])]);
        let err = Extractor::with_max_entry_size(64)
            .extract(&archive, &temp.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::EntryTooLarge { .. }));
    }

    #[test]
    fn test_unsupported_format() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("tool.rar");
        fs::write(&file, b"x").unwrap();
        let err = Extractor::new().extract(&file, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_dmg_requires_macos() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("App.dmg");
        fs::write(&file, b"x").unwrap();
        let err = Extractor::new().extract(&file, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::DiskImageUnsupported));
        assert_eq!(err.kind(), ErrorKind::SystemNotSupported);
    }
}
