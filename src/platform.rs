//! Host platform detection and normalization.
//!
//! Formulas key their download configuration by Go-style names
//! (`darwin`/`linux`, `amd64`/`arm64`), so Rust's `std::env::consts` values are
//! mapped onto those.

use std::fmt;

/// Normalized operating system and architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl AsRef<str>, arch: impl AsRef<str>) -> Self {
        Self {
            os: normalize_os(os.as_ref()),
            arch: normalize_arch(arch.as_ref()),
        }
    }

    /// The platform this process runs on.
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_darwin(&self) -> bool {
        self.os == "darwin"
    }

    pub fn is_linux(&self) -> bool {
        self.os == "linux"
    }

    pub fn is_supported(&self) -> bool {
        (self.is_darwin() || self.is_linux()) && matches!(self.arch.as_str(), "amd64" | "arm64")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// `macos`, `osx` and `mac` become `darwin`; everything is lowercased.
pub fn normalize_os(os: &str) -> String {
    let os = os.to_lowercase();
    match os.as_str() {
        "macos" | "osx" | "mac" => "darwin".to_string(),
        _ => os,
    }
}

/// `x86_64`/`x64` become `amd64`, `aarch64` becomes `arm64`.
pub fn normalize_arch(arch: &str) -> String {
    let arch = arch.to_lowercase();
    match arch.as_str() {
        "x86_64" | "x64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        _ => arch,
    }
}
