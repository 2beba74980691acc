use std::path::{Path, PathBuf};
use regex::Regex;
use walkdir::WalkDir;
use crate::error::{ErrorKind, Result, WandError};

/// Checks a package name: lowercase ASCII letters, digits and single hyphens,
/// starting with a letter and not ending with a hyphen.
pub fn validate_package_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        WandError::with_details(
            ErrorKind::InvalidPackageName,
            format!("Invalid package name: {name:?}"),
            reason.to_string(),
        )
    };
    if name.is_empty() {
        return Err(invalid("package name cannot be empty"));
    }
    let re = Regex::new(r"^[a-z]([a-z0-9-]*[a-z0-9])?$")
        .map_err(|e| WandError::wrap(ErrorKind::InvalidPackageName, "Invalid name pattern", e))?;
    if !re.is_match(name) {
        return Err(invalid(
            "use lowercase letters, digits and hyphens; start with a letter",
        ));
    }
    if name.contains("--") {
        return Err(invalid("no consecutive hyphens"));
    }
    Ok(())
}

/// Splits `name@version`. A bare name yields no version.
pub fn split_name_at_version(input: &str) -> (&str, Option<&str>) {
    match input.split_once('@') {
        Some((name, version)) if !version.is_empty() => (name, Some(version)),
        Some((name, _)) => (name, None),
        None => (input, None),
    }
}

/// Last path segment of a URL without query or fragment, `"package"` if empty.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if name.is_empty() || name.contains(':') || name == ".." || name == "." {
        "package".to_string()
    } else {
        name.to_string()
    }
}

/// Checks if a given path is an executable file on Unix.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Checks if a given path has a Windows executable extension (.exe, .bat, .cmd).
#[cfg(windows)]
pub fn is_executable(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        let ext = ext.to_ascii_lowercase();
        matches!(ext.as_str(), "exe" | "bat" | "cmd")
    } else {
        false
    }
}

/// Sets mode `0755`.
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Searches `dir` for an executable file called `name`.
pub fn find_binary(dir: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .find(|path| {
            let stem_matches = path
                .file_name()
                .is_some_and(|file| file == name)
                || (cfg!(windows) && path.file_stem().is_some_and(|stem| stem == name));
            stem_matches && is_executable(path)
        })
}

/// Where the executables of an installation live: `<install>/bin` if it
/// exists, otherwise the directory containing `binary`, otherwise the
/// installation root.
pub fn locate_bin_dir(install_dir: &Path, binary: &str) -> PathBuf {
    let bin = install_dir.join("bin");
    if bin.is_dir() {
        return bin;
    }
    find_binary(install_dir, binary)
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| install_dir.to_path_buf())
}

/// Creates a symlink at `link` pointing to `target`, replacing an existing link.
pub fn replace_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    if std::fs::symlink_metadata(link).is_ok() {
        std::fs::remove_file(link)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
    }
}
