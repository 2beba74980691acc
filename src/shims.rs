use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use crate::config::{create_dir, WandPaths};
use crate::error::{ErrorKind, Result, WandError};
use crate::formula::{FormulaSource, PackageType};
use crate::installer::normalize_version_key;
use crate::registry::RegistryStore;
use crate::util::make_executable;
use crate::wandrc::WandRc;

/// Unix shim. It carries no resolution logic of its own: it hands the package,
/// binary and arguments back to `wand shim-exec`, which resolves the version
/// for the caller's working directory and replaces itself with the binary.
///
/// Placeholders sit inside single quotes; values are escaped with [`sh_escape`].
const SHIM_TEMPLATE: &str = r#"#!/bin/sh
# wand shim for {{BINARY_NAME}} ({{PACKAGE_NAME}})
WAND_HOME='{{WAND_DIR}}' exec '{{WAND_EXE}}' shim-exec '{{PACKAGE_NAME}}' '{{BINARY_NAME}}' -- "$@"
"#;

/// Windows shim, a `.bat` next to the Unix name.
const BAT_TEMPLATE: &str = "@echo off\r\nset \"WAND_HOME={{WAND_DIR}}\"\r\n\"{{WAND_EXE}}\" shim-exec \"{{PACKAGE_NAME}}\" \"{{BINARY_NAME}}\" -- %*\r\n";

/// Generates shims and answers which installed binary a shim should run.
///
/// Version resolution for a package, starting in a directory:
/// 1. If the directory has a `.wandrc` that pins the package, use the pin.
/// 2. If it has a `.wandrc` without a pin, repeat from the parent directory
///    (stopping below `/`).
/// 3. Otherwise use the package's global version from the registry.
pub struct ShimService {
    paths: WandPaths,
    registry: Arc<dyn RegistryStore>,
    formulas: Arc<dyn FormulaSource>,
    wand_exe: PathBuf,
}

impl ShimService {
    /// `wand_exe` is the executable the generated shims call back into.
    pub fn new(
        paths: WandPaths,
        registry: Arc<dyn RegistryStore>,
        formulas: Arc<dyn FormulaSource>,
        wand_exe: impl Into<PathBuf>,
    ) -> Self {
        Self {
            paths,
            registry,
            formulas,
            wand_exe: wand_exe.into(),
        }
    }

    /// Resolves the version of `name` to use when invoked from `current_dir`.
    ///
    /// # Errors
    /// [`ErrorKind::VersionNotFound`] if neither a `.wandrc` pin nor a global
    /// version exists.
    pub fn resolve_version(&self, name: &str, current_dir: &Path) -> Result<String> {
        if WandRc::exists_in(current_dir) {
            let rc = WandRc::load(current_dir)?;
            if let Some(version) = rc.get_version(name) {
                debug!(package = name, version, dir = %current_dir.display(), "Pinned by .wandrc");
                return Ok(version.to_string());
            }
            if let Some(parent) = current_dir.parent() {
                if parent != Path::new("/") && !parent.as_os_str().is_empty() {
                    return self.resolve_version(name, parent);
                }
            }
        }

        let registry = self.registry.load()?;
        registry
            .global_version(name)
            .map(str::to_string)
            .ok_or_else(|| {
                WandError::with_details(
                    ErrorKind::VersionNotFound,
                    format!("No version found for package {name}"),
                    format!("run: wand install {name}"),
                )
            })
    }

    /// Full path of `binary` inside the installed `name@version`.
    pub fn binary_path(&self, name: &str, version: &str, binary: &str) -> Result<PathBuf> {
        let registry = self.registry.load()?;
        let package = registry
            .get_package(name, &normalize_version_key(version))
            .ok_or_else(|| WandError::not_installed(name, Some(version)))?;

        let path = package.bin_path.join(binary);
        if path.is_file() {
            return Ok(path);
        }
        if cfg!(windows) {
            let exe = path.with_extension("exe");
            if exe.is_file() {
                return Ok(exe);
            }
        }
        Err(WandError::with_details(
            ErrorKind::BinaryNotFound,
            format!("Binary {binary} not found"),
            format!("expected at {}; try: wand install {name}@{version} --force", path.display()),
        ))
    }

    /// Resolves the version for `current_dir` and returns the binary to run.
    pub fn resolve_binary(&self, name: &str, binary: &str, current_dir: &Path) -> Result<PathBuf> {
        let version = self.resolve_version(name, current_dir)?;
        self.binary_path(name, &version, binary)
    }

    /// Location of the shim for `binary`.
    pub fn shim_path(&self, binary: &str) -> PathBuf {
        let path = self.paths.shims_dir().join(binary);
        if cfg!(windows) {
            path.with_extension("bat")
        } else {
            path
        }
    }

    pub fn shim_script(&self, name: &str, binary: &str) -> String {
        let (template, escape): (&str, fn(&str) -> String) = if cfg!(windows) {
            (BAT_TEMPLATE, str::to_string)
        } else {
            (SHIM_TEMPLATE, sh_escape)
        };
        template
            .replace("{{WAND_DIR}}", &escape(&self.paths.wand_dir.to_string_lossy()))
            .replace("{{WAND_EXE}}", &escape(&self.wand_exe.to_string_lossy()))
            .replace("{{PACKAGE_NAME}}", &escape(name))
            .replace("{{BINARY_NAME}}", &escape(binary))
    }

    /// Writes an executable shim for each of `binaries`.
    pub fn create_shims(&self, name: &str, binaries: &[String]) -> Result<()> {
        create_dir(&self.paths.shims_dir())?;
        for binary in binaries {
            let path = self.shim_path(binary);
            std::fs::write(&path, self.shim_script(name, binary))
                .and_then(|_| make_executable(&path))
                .map_err(|e| {
                    WandError::wrap(
                        ErrorKind::ShimCreationFailed,
                        format!("Failed to create shim for {binary}"),
                        e,
                    )
                })?;
            debug!(shim = %path.display(), package = name, "Created shim");
        }
        Ok(())
    }

    pub fn remove_shims(&self, binaries: &[String]) -> Result<()> {
        for binary in binaries {
            let path = self.shim_path(binary);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| {
                    WandError::wrap(
                        ErrorKind::ShimExecutionFailed,
                        format!("Failed to remove shim for {binary}"),
                        e,
                    )
                })?;
                debug!(shim = %path.display(), "Removed shim");
            }
        }
        Ok(())
    }

    /// Wipes the shims directory and recreates shims for every installed CLI
    /// package. Returns the number of shims written.
    pub fn refresh_all_shims(&self) -> Result<usize> {
        let registry = self.registry.load()?;
        let shims_dir = self.paths.shims_dir();
        if shims_dir.exists() {
            std::fs::remove_dir_all(&shims_dir).map_err(|e| {
                WandError::wrap(ErrorKind::PermissionDenied, "Failed to clear shims directory", e)
            })?;
        }
        create_dir(&shims_dir)?;

        let mut count = 0;
        for entry in registry.entries().filter(|e| e.package_type == PackageType::Cli) {
            let binaries = binaries_for(self.formulas.as_ref(), &entry.name);
            self.create_shims(&entry.name, &binaries)
                .map_err(|e| e.context(format!("Failed to create shims for {}", entry.name)))?;
            count += binaries.len();
        }
        info!(count, "Refreshed shims");
        Ok(count)
    }
}

/// Escapes `value` for use between single quotes in `sh`.
fn sh_escape(value: &str) -> String {
    value.replace('\'', r"'\''")
}

/// Executables declared by the package's formula, or the package name when
/// there is no formula or it declares none.
pub fn binaries_for(formulas: &dyn FormulaSource, name: &str) -> Vec<String> {
    match formulas.get_formula(name) {
        Ok(formula) if !formula.binaries.is_empty() => formula.binaries,
        _ => vec![name.to_string()],
    }
}

/// Replaces the current process with `binary`. Only returns on failure, or on
/// platforms without `exec`, with the child's exit code.
pub fn exec_binary(binary: &Path, args: &[OsString]) -> Result<i32> {
    let mut command = std::process::Command::new(binary);
    command.args(args);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = command.exec();
        Err(WandError::wrap(
            ErrorKind::ShimExecutionFailed,
            format!("Failed to execute {}", binary.display()),
            err,
        ))
    }
    #[cfg(not(unix))]
    {
        let status = command.status().map_err(|e| {
            WandError::wrap(
                ErrorKind::ShimExecutionFailed,
                format!("Failed to execute {}", binary.display()),
                e,
            )
        })?;
        Ok(status.code().unwrap_or(1))
    }
}
