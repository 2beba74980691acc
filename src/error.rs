//! Error types shared by every wand service.
//!
//! Errors are classified by [`ErrorKind`] rather than by type. A [`WandError`]
//! carries its kind, a human readable message, optional structured details and
//! an optional underlying cause.

use std::fmt;
use thiserror::Error;

/// Result type for wand operations.
pub type Result<T> = std::result::Result<T, WandError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // invalid input
    InvalidPackageName,
    InvalidVersion,
    InvalidPath,
    InvalidUrl,
    // not found
    PackageNotFound,
    PackageNotInstalled,
    VersionNotFound,
    FormulaNotFound,
    BinaryNotFound,
    FileNotFound,
    DirNotFound,
    // already exists
    PackageInstalled,
    VersionInstalled,
    // operational
    DownloadFailed,
    ChecksumMismatch,
    ExtractionFailed,
    InstallationFailed,
    ShimCreationFailed,
    ShimExecutionFailed,
    // resources
    PermissionDenied,
    DiskSpaceLow,
    // network
    NetworkUnreachable,
    HttpError,
    Timeout,
    // configuration
    ConfigMissing,
    ConfigInvalid,
    RegistryCorrupted,
    SystemNotSupported,
    ArchNotSupported,
}

impl ErrorKind {
    /// Stable code printed in front of every error message.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPackageName => "INVALID_PACKAGE_NAME",
            ErrorKind::InvalidVersion => "INVALID_VERSION",
            ErrorKind::InvalidPath => "INVALID_PATH",
            ErrorKind::InvalidUrl => "INVALID_URL",
            ErrorKind::PackageNotFound => "PACKAGE_NOT_FOUND",
            ErrorKind::PackageNotInstalled => "PACKAGE_NOT_INSTALLED",
            ErrorKind::VersionNotFound => "VERSION_NOT_FOUND",
            ErrorKind::FormulaNotFound => "FORMULA_NOT_FOUND",
            ErrorKind::BinaryNotFound => "BINARY_NOT_FOUND",
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::DirNotFound => "DIR_NOT_FOUND",
            ErrorKind::PackageInstalled => "PACKAGE_INSTALLED",
            ErrorKind::VersionInstalled => "VERSION_INSTALLED",
            ErrorKind::DownloadFailed => "DOWNLOAD_FAILED",
            ErrorKind::ChecksumMismatch => "CHECKSUM_MISMATCH",
            ErrorKind::ExtractionFailed => "EXTRACTION_FAILED",
            ErrorKind::InstallationFailed => "INSTALLATION_FAILED",
            ErrorKind::ShimCreationFailed => "SHIM_CREATION_FAILED",
            ErrorKind::ShimExecutionFailed => "SHIM_EXECUTION_FAILED",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::DiskSpaceLow => "DISK_SPACE_LOW",
            ErrorKind::NetworkUnreachable => "NETWORK_UNREACHABLE",
            ErrorKind::HttpError => "HTTP_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ConfigMissing => "CONFIG_MISSING",
            ErrorKind::ConfigInvalid => "CONFIG_INVALID",
            ErrorKind::RegistryCorrupted => "REGISTRY_CORRUPTED",
            ErrorKind::SystemNotSupported => "SYSTEM_NOT_SUPPORTED",
            ErrorKind::ArchNotSupported => "ARCH_NOT_SUPPORTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified wand error.
#[derive(Debug, Error)]
#[error("[{kind}] {message}{}", .details.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct WandError {
    kind: ErrorKind,
    message: String,
    details: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl WandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn with_details(
        kind: ErrorKind,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details.into()),
            source: None,
        }
    }

    /// Wraps a lower-level error with a domain kind.
    pub fn wrap<E>(kind: ErrorKind, message: impl Into<String>, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: Some(err.into()),
        }
    }

    /// Wraps this error under a higher-level message, keeping its kind.
    pub fn context(self, message: impl Into<String>) -> Self {
        let kind = self.kind;
        Self::wrap(kind, message, self)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn package_not_found(name: &str) -> Self {
        Self::with_details(
            ErrorKind::PackageNotFound,
            "Package not found",
            format!("package: {name:?}"),
        )
    }

    pub fn version_not_found(name: &str, version: &str) -> Self {
        Self::with_details(
            ErrorKind::VersionNotFound,
            "Version not found",
            format!("package: {name:?}, version: {version:?}"),
        )
    }

    pub fn not_installed(name: &str, version: Option<&str>) -> Self {
        let details = match version {
            Some(version) => format!("package: {name:?}, version: {version:?}"),
            None => format!("package: {name:?}"),
        };
        Self::with_details(ErrorKind::PackageNotInstalled, "Package not installed", details)
    }
}
